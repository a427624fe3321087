use chrono::{Datelike, NaiveDate, Utc};

use ticketflow_core::CardDetails;

/// Card fields after validation: digits-only number, trimmed holder
#[derive(Debug, Clone)]
pub struct ValidatedCard {
    pub number: String,
    pub holder: String,
    pub expiry: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CardError {
    #[error("Card number must have 16 digits")]
    BadNumber,

    #[error("Card holder name must have at least 3 characters")]
    BadHolder,

    #[error("Card expiry must be MM/YY")]
    BadExpiry,

    #[error("Card is expired")]
    Expired,

    #[error("CVV must have 3 or 4 digits")]
    BadCvv,
}

/// Validate raw card input. The number is normalized by stripping
/// whitespace; everything else is checked as submitted.
pub fn validate(card: &CardDetails) -> Result<ValidatedCard, CardError> {
    let number: String = card.number.chars().filter(|c| !c.is_whitespace()).collect();
    if number.len() != 16 || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(CardError::BadNumber);
    }

    let holder = card.holder.trim();
    if holder.chars().count() < 3 {
        return Err(CardError::BadHolder);
    }

    let (month, year) = parse_expiry(&card.expiry)?;
    // Expiry resolves to the first day of the stated month
    let expiry_date =
        NaiveDate::from_ymd_opt(2000 + year as i32, month, 1).ok_or(CardError::BadExpiry)?;
    let today = Utc::now().date_naive();
    if expiry_date < NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today) {
        return Err(CardError::Expired);
    }

    if card.cvv.len() != 3 && card.cvv.len() != 4 {
        return Err(CardError::BadCvv);
    }
    if !card.cvv.chars().all(|c| c.is_ascii_digit()) {
        return Err(CardError::BadCvv);
    }

    Ok(ValidatedCard {
        number,
        holder: holder.to_string(),
        expiry: card.expiry.clone(),
    })
}

/// First four and last four digits visible, middle masked
pub fn mask_number(number: &str) -> String {
    format!("{}********{}", &number[..4], &number[number.len() - 4..])
}

fn parse_expiry(expiry: &str) -> Result<(u32, u32), CardError> {
    let (mm, yy) = expiry.split_once('/').ok_or(CardError::BadExpiry)?;
    if mm.len() != 2 || yy.len() != 2 {
        return Err(CardError::BadExpiry);
    }
    let month: u32 = mm.parse().map_err(|_| CardError::BadExpiry)?;
    let year: u32 = yy.parse().map_err(|_| CardError::BadExpiry)?;
    if !(1..=12).contains(&month) {
        return Err(CardError::BadExpiry);
    }
    Ok((month, year))
}
