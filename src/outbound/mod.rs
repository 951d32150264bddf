pub mod pawapay;
