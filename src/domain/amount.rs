use thiserror::Error;

/// Decimal places accepted per correspondent.
///
/// `None` means the rail only settles whole amounts, `Some(n)` allows at most
/// `n` fractional digits. Mirrors the provider's published table and has to be
/// updated by hand when a correspondent is added or its rule changes.
pub const DECIMAL_RULES: &[(&str, Option<usize>)] = &[
    // Benin
    ("MTN_MOMO_BEN", None),
    ("MOOV_BEN", None),
    // Burkina Faso
    ("MOOV_BFA", None),
    ("ORANGE_BFA", None),
    // Cameroon
    ("MTN_MOMO_CMR", None),
    ("ORANGE_CMR", None),
    // Côte d'Ivoire
    ("MTN_MOMO_CIV", None),
    ("ORANGE_CIV", None),
    // DR Congo
    ("VODACOM_MPESA_COD", Some(2)),
    ("AIRTEL_COD", Some(2)),
    ("ORANGE_COD", Some(2)),
    // Gabon
    ("AIRTEL_GAB", None),
    // Ghana
    ("MTN_MOMO_GHA", Some(2)),
    ("AIRTELTIGO_GHA", Some(2)),
    ("VODAFONE_GHA", Some(2)),
    // Kenya
    ("MPESA_KEN", None),
    // Malawi
    ("AIRTEL_MWI", Some(2)),
    ("TNM_MWI", Some(2)),
    // Mozambique
    ("VODACOM_MOZ", Some(2)),
    // Nigeria
    ("AIRTEL_NGA", Some(2)),
    ("MTN_MOMO_NGA", Some(2)),
    // Republic of the Congo
    ("AIRTEL_COG", None),
    ("MTN_MOMO_COG", None),
    // Rwanda
    ("AIRTEL_RWA", None),
    ("MTN_MOMO_RWA", None),
    // Senegal
    ("FREE_SEN", None),
    ("ORANGE_SEN", None),
    // Sierra Leone
    ("ORANGE_SLE", Some(2)),
    // Tanzania
    ("AIRTEL_TZA", None),
    ("VODACOM_TZA", None),
    ("TIGO_TZA", None),
    ("HALOTEL_TZA", None),
    // Uganda
    ("AIRTEL_OAPI_UGA", None),
    ("MTN_MOMO_UGA", None),
    // Zambia
    ("AIRTEL_OAPI_ZMB", Some(2)),
    ("MTN_MOMO_ZMB", Some(2)),
    ("ZAMTEL_ZMB", Some(2)),
];

/// Error type for amount validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Unknown correspondent: {0}")]
    UnknownCorrespondent(String),

    #[error("Invalid amount format: {0:?}")]
    InvalidFormat(String),
}

/// Look up the decimal rule of a correspondent.
///
/// The outer `Option` is `None` when the correspondent is not in the table.
pub fn decimal_rule(correspondent: &str) -> Option<Option<usize>> {
    DECIMAL_RULES
        .iter()
        .find(|(name, _)| *name == correspondent)
        .map(|(_, rule)| *rule)
}

/// Check an amount string against the correspondent's decimal rule.
///
/// Unknown correspondents and strings that are not plain non-negative decimal
/// numbers are errors. No rounding is applied: `Ok(false)` means the caller has
/// to fix the amount before sending it.
pub fn validate(amount: &str, correspondent: &str) -> Result<bool, AmountError> {
    let rule = decimal_rule(correspondent)
        .ok_or_else(|| AmountError::UnknownCorrespondent(correspondent.to_string()))?;

    let (whole, fraction) = split_amount(amount)?;

    let valid = match (rule, fraction) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(max_places), Some(fraction)) => fraction.len() <= max_places,
    };

    if !valid {
        tracing::debug!(amount, whole, correspondent, "Amount violates decimal rule");
    }

    Ok(valid)
}

/// Split `amount` into its whole and fractional digits.
fn split_amount(amount: &str) -> Result<(&str, Option<&str>), AmountError> {
    let invalid = || AmountError::InvalidFormat(amount.to_string());
    let is_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());

    let mut parts = amount.split('.');
    let whole = parts.next().filter(|p| is_digits(p)).ok_or_else(invalid)?;
    let fraction = match parts.next() {
        Some(fraction) if is_digits(fraction) => Some(fraction),
        Some(_) => return Err(invalid()),
        None => None,
    };

    if parts.next().is_some() {
        return Err(invalid());
    }

    Ok((whole, fraction))
}
