use subtle::ConstantTimeEq;

/// Verify WhatsApp webhook subscription request.
/// Returns the challenge token if verification succeeds.
pub(crate) fn verify_whatsapp_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: Option<&str>,
) -> Result<String, &'static str> {
    let Some(expected) = expected_token.filter(|value| !value.trim().is_empty()) else {
        return Err("verify_token_not_configured");
    };

    let provided_token = token.ok_or("missing_token")?;
    let token_matches: bool = provided_token.as_bytes().ct_eq(expected.as_bytes()).into();

    if mode != Some("subscribe") {
        return Err("invalid_mode");
    }
    if !token_matches {
        return Err("token_mismatch");
    }

    challenge.map(|c| c.to_string()).ok_or("missing_challenge")
}

/// Loggable form of a supplied token. Only the length is kept, since a
/// correct token may arrive with a wrong mode.
pub(crate) fn mask_token(token: Option<&str>) -> String {
    match token {
        None => "<none>".to_string(),
        Some(value) => format!("<provided len={}>", value.chars().count()),
    }
}
