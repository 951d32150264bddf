// Inbound provider webhooks
//
//   dispatcher – verifies and routes callbacks by provider path segment
//   stripe     – Stripe-Signature HMAC verification

pub mod dispatcher;
pub mod stripe;

pub use dispatcher::{Acknowledgement, DispatchError, Provider, WebhookDispatcher, route_callback};
pub use stripe::{StripeEvent, StripeSignatureError, StripeVerifier};
