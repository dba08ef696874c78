//! Sanitization and validation of donor-supplied input.
//!
//! Malformed (as opposed to missing) input degrades to a safe default or an
//! error entry; nothing here panics on bad data.

use validator::ValidateEmail;

use crate::dtos::InitiateDonationRequest;
use crate::models::DonationType;

pub const MIN_AMOUNT: f64 = 1.0;
pub const MAX_AMOUNT: f64 = 100_000.0;

pub const NAME_MAX_LEN: usize = 100;
pub const PHONE_MAX_LEN: usize = 20;
pub const MESSAGE_MAX_LEN: usize = 500;
pub const CAMPAIGN_MAX_LEN: usize = 150;

/// Campaign keyword table, scanned in order; first match wins. More specific
/// keywords sit above the generic ones so "Annadaana Seva" resolves to
/// annadaana, not service.
const CAMPAIGN_KEYWORDS: &[(&str, DonationType)] = &[
    ("annadaana", DonationType::Annadaana),
    ("annadaan", DonationType::Annadaana),
    ("sai aangan", DonationType::SaiAangan),
    ("aangan", DonationType::SaiAangan),
    ("needy", DonationType::ServiceToNeedy),
    ("puja", DonationType::Puja),
    ("pooja", DonationType::Puja),
    ("archana", DonationType::Puja),
    ("abhishek", DonationType::Puja),
    ("recurring", DonationType::Recurring),
    ("monthly", DonationType::Recurring),
    ("seva", DonationType::Service),
    ("service", DonationType::Service),
];

#[derive(Debug, Clone)]
pub struct SanitizedDonation {
    pub donor_name: String,
    pub donor_email: Option<String>,
    pub donor_phone: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub campaign_name: Option<String>,
    pub donation_type: DonationType,
    pub message: Option<String>,
    pub metadata: serde_json::Value,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn validate_amount(raw: f64) -> Result<f64, String> {
    if !raw.is_finite() || raw <= 0.0 {
        return Err("Amount must be a valid number".to_string());
    }
    if raw < MIN_AMOUNT {
        return Err("Minimum donation is $1".to_string());
    }
    if raw > MAX_AMOUNT {
        return Err("Amount exceeds maximum limit of $100,000".to_string());
    }
    Ok(round2(raw))
}

/// Lowercased and validated; an invalid address yields `None` rather than a
/// hard failure.
pub fn sanitize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.validate_email() { Some(email) } else { None }
}

/// Strips angle brackets, quotes, backslashes, `javascript:` scheme markers,
/// inline event-handler attribute patterns, and control characters, then
/// truncates. Defense in depth against stored markup, not a full HTML
/// sanitizer.
pub fn sanitize_text(raw: &str, max_len: usize) -> String {
    let filtered: String = raw
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '`' | '\\') && !c.is_control())
        .collect();
    let no_scheme = strip_substring_ci(&filtered, "javascript:");
    let cleaned = strip_event_handlers(&no_scheme);
    cleaned.trim().chars().take(max_len).collect()
}

fn strip_substring_ci(input: &str, pattern: &str) -> String {
    // ASCII-lowered copy keeps byte offsets aligned with `input`.
    let lowered = input.to_ascii_lowercase();
    let mut out = String::with_capacity(input.len());
    let mut pos = 0;
    while let Some(found) = lowered[pos..].find(pattern) {
        out.push_str(&input[pos..pos + found]);
        pos += found + pattern.len();
    }
    out.push_str(&input[pos..]);
    out
}

/// Drops tokens shaped like `onxxx=` (inline handler attributes).
fn strip_event_handlers(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        let at_boundary = i == 0 || !chars[i - 1].is_alphanumeric();
        if at_boundary
            && i + 1 < chars.len()
            && chars[i].eq_ignore_ascii_case(&'o')
            && chars[i + 1].eq_ignore_ascii_case(&'n')
        {
            let mut j = i + 2;
            while j < chars.len() && chars[j].is_ascii_alphabetic() {
                j += 1;
            }
            let name_len = j - (i + 2);
            let mut k = j;
            while k < chars.len() && chars[k].is_whitespace() {
                k += 1;
            }
            if name_len > 0 && k < chars.len() && chars[k] == '=' {
                i = k + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Explicit type wins when it names a member of the closed set; otherwise
/// the campaign name is scanned against the keyword table; otherwise
/// `general`.
pub fn resolve_donation_type(explicit: Option<&str>, campaign: Option<&str>) -> DonationType {
    if let Some(ty) = explicit.and_then(DonationType::parse) {
        return ty;
    }
    if let Some(campaign) = campaign {
        let lowered = campaign.to_lowercase();
        for (keyword, ty) in CAMPAIGN_KEYWORDS {
            if lowered.contains(keyword) {
                return *ty;
            }
        }
    }
    DonationType::General
}

/// Returns a sanitized value set or a non-empty list of validation errors.
pub fn sanitize_donation_input(
    req: &InitiateDonationRequest,
) -> Result<SanitizedDonation, Vec<String>> {
    let mut errors = Vec::new();

    let amount = match validate_amount(req.amount) {
        Ok(v) => v,
        Err(e) => {
            errors.push(e);
            0.0
        }
    };

    let donor_name = sanitize_text(&req.donor_name, NAME_MAX_LEN);
    if donor_name.is_empty() {
        errors.push("Donor name is required".to_string());
    }

    let donor_email = req.donor_email.as_deref().and_then(sanitize_email);
    let donor_phone = req
        .donor_phone
        .as_deref()
        .map(|p| sanitize_text(p, PHONE_MAX_LEN))
        .filter(|p| !p.is_empty());

    let currency = match req.currency.as_deref().map(str::trim) {
        None | Some("") => "USD".to_string(),
        Some(raw) if raw.len() == 3 && raw.chars().all(|c| c.is_ascii_alphabetic()) => {
            raw.to_uppercase()
        }
        Some(raw) => {
            errors.push(format!("Unsupported currency: {raw}"));
            "USD".to_string()
        }
    };

    let campaign_name = req
        .campaign_name
        .as_deref()
        .map(|c| sanitize_text(c, CAMPAIGN_MAX_LEN))
        .filter(|c| !c.is_empty());
    let message = req
        .message
        .as_deref()
        .map(|m| sanitize_text(m, MESSAGE_MAX_LEN))
        .filter(|m| !m.is_empty());

    let donation_type =
        resolve_donation_type(req.donation_type.as_deref(), campaign_name.as_deref());

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(SanitizedDonation {
        donor_name,
        donor_email,
        donor_phone,
        amount,
        currency,
        campaign_name,
        donation_type,
        message,
        metadata: req.metadata.clone().unwrap_or(serde_json::Value::Null),
    })
}
