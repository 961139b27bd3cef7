//! One-time codes for phone verification. Codes are kept in process memory
//! and are only logged; there is no SMS delivery.

use std::collections::HashMap;

use rand::Rng;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

pub const OTP_TTL: Duration = Duration::minutes(5);

#[derive(Debug, Clone)]
struct OtpRecord {
    code: String,
    expires_at: OffsetDateTime,
}

#[derive(Debug, Default)]
pub struct OtpStore {
    records: Mutex<HashMap<String, OtpRecord>>,
}

impl OtpStore {
    /// Generates a fresh 6-digit code for `phone`, replacing any previous one.
    pub async fn issue(&self, phone: &str) -> String {
        self.issue_at(phone, OffsetDateTime::now_utc()).await
    }

    pub async fn issue_at(&self, phone: &str, now: OffsetDateTime) -> String {
        let code = rand::thread_rng().gen_range(100_000..1_000_000).to_string();
        let mut records = self.records.lock().await;
        records.retain(|_, r| r.expires_at >= now);
        records.insert(
            phone.to_string(),
            OtpRecord {
                code: code.clone(),
                expires_at: now + OTP_TTL,
            },
        );
        code
    }

    /// Consumes the code on success; a code is accepted at most once.
    pub async fn verify(&self, phone: &str, code: &str) -> bool {
        self.verify_at(phone, code, OffsetDateTime::now_utc()).await
    }

    pub async fn verify_at(&self, phone: &str, code: &str, now: OffsetDateTime) -> bool {
        let mut records = self.records.lock().await;
        match records.get(phone) {
            Some(r) if r.code == code && r.expires_at >= now => {
                records.remove(phone);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn code_is_six_digits() {
        let store = OtpStore::default();
        let code = store.issue("+15550100").await;
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn code_is_single_use() {
        let store = OtpStore::default();
        let code = store.issue("+15550100").await;
        assert!(store.verify("+15550100", &code).await);
        assert!(!store.verify("+15550100", &code).await);
    }

    #[tokio::test]
    async fn wrong_code_or_number_fails_without_consuming() {
        let store = OtpStore::default();
        let code = store.issue("+15550100").await;
        let wrong = if code == "123456" { "654321" } else { "123456" };
        assert!(!store.verify("+15550100", wrong).await);
        assert!(!store.verify("+15550199", &code).await);
        assert!(store.verify("+15550100", &code).await);
    }

    #[tokio::test]
    async fn code_expires_after_five_minutes() {
        let store = OtpStore::default();
        let now = OffsetDateTime::now_utc();
        let code = store.issue_at("+15550100", now).await;
        assert!(
            !store
                .verify_at("+15550100", &code, now + Duration::minutes(5) + Duration::seconds(1))
                .await
        );

        let code = store.issue_at("+15550100", now).await;
        assert!(
            store
                .verify_at("+15550100", &code, now + Duration::minutes(4))
                .await
        );
    }

    #[tokio::test]
    async fn reissue_replaces_previous_code() {
        let store = OtpStore::default();
        let now = OffsetDateTime::now_utc();
        let first = store.issue_at("+15550100", now).await;
        let mut second = store.issue_at("+15550100", now).await;
        while second == first {
            second = store.issue_at("+15550100", now).await;
        }
        assert!(!store.verify_at("+15550100", &first, now).await);
        assert!(store.verify_at("+15550100", &second, now).await);
    }
}
