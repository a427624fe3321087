use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Inputs for a provider-agnostic transfer payload
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub key: String,
    pub amount_cents: i64,
    pub transaction_id: String,
    pub description: String,
    pub merchant: String,
    pub city: String,
}

/// Externally-visible transaction identifier, e.g. `PIX1724932800123a1b2c3d4e`
pub fn transaction_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("{}{}{}", prefix, Utc::now().timestamp_millis(), suffix)
}

/// Random receiving key for merchants that did not supply one
pub fn generate_key() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("ticketflow{}{}@ticketflow.com", Utc::now().timestamp_millis(), suffix)
}

/// BR-Code-style payload string the buyer's bank app understands
pub fn build_payload(request: &TransferRequest) -> String {
    let amount = format!("{:.2}", request.amount_cents as f64 / 100.0);
    format!(
        "00020126580014br.gov.bcb.pix0136{}520400005303986540{}5802BR590{}600{}6214{}6304",
        request.key, amount, request.merchant, request.city, request.transaction_id
    )
}

/// Scannable encoding of the payload, as a data URI
pub fn encode_qr(payload: &str) -> String {
    format!("data:text/plain;base64,{}", BASE64.encode(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_carries_key_amount_and_transaction() {
        let request = TransferRequest {
            key: "merchant@ticketflow.com".to_string(),
            amount_cents: 12_345,
            transaction_id: "PIX123abc".to_string(),
            description: "Ticket: Jazz Night".to_string(),
            merchant: "TicketFlow Events".to_string(),
            city: "Sao Paulo".to_string(),
        };

        let payload = build_payload(&request);
        assert!(payload.contains("merchant@ticketflow.com"));
        assert!(payload.contains("123.45"));
        assert!(payload.contains("PIX123abc"));
        assert!(payload.starts_with("000201"));
    }

    #[test]
    fn test_qr_encoding_round_trips() {
        let qr = encode_qr("hello");
        let encoded = qr.strip_prefix("data:text/plain;base64,").unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap(), b"hello");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(transaction_id("TXN"), transaction_id("TXN"));
        assert_ne!(generate_key(), generate_key());
        assert!(transaction_id("PIX").starts_with("PIX"));
        assert!(generate_key().ends_with("@ticketflow.com"));
    }
}
