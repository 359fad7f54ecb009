use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

// Path traversal, raw or after decoding
static PATH_TRAVERSAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\.").expect("traversal pattern is valid"));

// Control characters, encoded CR/LF/NUL/TAB, backslashes and invisible separators
static SUSPICIOUS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)[\x00-\x1F\x7F-\x9F]|%(?:00|0[ad]|09|5c)|\\",
        r"|[\u{200E}\u{200F}\u{2060}-\u{2064}\u{2000}-\u{200A}]",
    ))
    .expect("suspicious pattern is valid")
});

const DANGEROUS_PROTOCOLS: &[&str] = &["javascript:", "vbscript:", "data:", "file:", "ftp:"];

const MAX_REDIRECT_LENGTH: usize = 2048;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedirectRejection {
    #[error("redirect URL is too long")]
    TooLong,
    #[error("redirect URL contains a suspicious pattern")]
    SuspiciousPattern,
    #[error("redirect URL is not an absolute URL")]
    NotAbsolute,
    #[error("redirect URL must use https")]
    InsecureScheme,
    #[error("redirect host '{0}' is not allowed")]
    HostNotAllowed(String),
}

/// Validate a logout `returnUrl`.
///
/// Only absolute `https` URLs whose host is listed in `allowed_hosts` pass,
/// after rejecting traversal, control characters and script-capable schemes
/// in the raw, decoded and double-decoded forms.
///
/// # Errors
///
/// Returns the first [`RedirectRejection`] that applies
pub fn validate_logout_redirect(
    redirect_url: &str,
    allowed_hosts: &[String],
) -> Result<Url, RedirectRejection> {
    debug!("Validating logout redirect URL: {redirect_url}");

    if redirect_url.len() > MAX_REDIRECT_LENGTH {
        warn!("Excessively long redirect URL: {} characters", redirect_url.len());
        return Err(RedirectRejection::TooLong);
    }

    for variant in decoded_variants(redirect_url) {
        if PATH_TRAVERSAL_PATTERN.is_match(&variant)
            || SUSPICIOUS_PATTERN.is_match(&variant)
            || contains_dangerous_protocol(&variant.to_lowercase())
            || variant.matches('@').count() > 1
        {
            warn!("Suspicious pattern in redirect URL: {redirect_url}");
            return Err(RedirectRejection::SuspiciousPattern);
        }
    }

    let parsed = Url::parse(redirect_url).map_err(|_| RedirectRejection::NotAbsolute)?;
    if parsed.scheme() != "https" {
        warn!("Rejected non-https redirect URL: {redirect_url}");
        return Err(RedirectRejection::InsecureScheme);
    }

    // Credentials in the authority can disguise the real host
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(RedirectRejection::SuspiciousPattern);
    }

    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    if !allowed_hosts.iter().any(|allowed| allowed.eq_ignore_ascii_case(&host)) {
        warn!("Rejected redirect to unlisted host: {host}");
        return Err(RedirectRejection::HostNotAllowed(host));
    }

    Ok(parsed)
}

/// The input, its URL-decoded form and its double-decoded form, without duplicates
fn decoded_variants(input: &str) -> Vec<String> {
    let mut variants = vec![input.to_string()];

    if let Ok(decoded) = urlencoding::decode(input) {
        let decoded = decoded.into_owned();
        if decoded != input {
            if let Ok(double_decoded) = urlencoding::decode(&decoded) {
                let double_decoded = double_decoded.into_owned();
                if double_decoded != decoded {
                    variants.push(double_decoded);
                }
            }
            variants.push(decoded);
        }
    }

    variants
}

fn contains_dangerous_protocol(text: &str) -> bool {
    DANGEROUS_PROTOCOLS
        .iter()
        .any(|protocol| text.contains(protocol))
}
