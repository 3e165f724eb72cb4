//! Fiskalizacija: ACK kodovi i politika ponavljanja.
//!
//! Porezna uprava odgovara ACK kodom: 10 prihvaćeno, 90 neispravan XML,
//! 91 neispravan potpis, 99 greška servera. Samo 99 je retryable —
//! eksponencijalni backoff 5/10/20/40/80 s, najviše 5 pokušaja; 90 i 91
//! traže ljudsku dijagnostiku.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maksimalan broj ponavljanja za ACK 99.
pub const MAX_RETRIES: u32 = 5;
/// Početni backoff, sekunde.
pub const BACKOFF_BASE_SECS: u64 = 5;

/// ACK kod fiskalizacijskog servisa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckCode {
    /// 10 — prihvaćeno, račun se knjiži.
    Accepted,
    /// 90 — neispravan XML; dijagnostika i prijedlog ispravka.
    InvalidXml,
    /// 91 — neispravan potpis; dijagnostika certifikata.
    InvalidSignature,
    /// 99 — greška servera; retry s backoffom.
    ServerError,
}

impl AckCode {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            10 => Some(Self::Accepted),
            90 => Some(Self::InvalidXml),
            91 => Some(Self::InvalidSignature),
            99 => Some(Self::ServerError),
            _ => None,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::Accepted => 10,
            Self::InvalidXml => 90,
            Self::InvalidSignature => 91,
            Self::ServerError => 99,
        }
    }
}

/// Što sustav radi s danim ACK kodom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum AckPolicy {
    /// Knjiži račun.
    Post,
    /// Pokreni dijagnostiku XML-a i predloži ispravak.
    DiagnoseXml,
    /// Pokreni dijagnostiku certifikata/potpisa.
    DiagnoseCertificate,
    /// Ponovi za `delay_secs`; `attempt` je sljedeći redni pokušaj.
    Retry { attempt: u32, delay_secs: u64 },
    /// Iscrpljeni pokušaji — predaj čovjeku.
    GiveUp,
}

/// Odluči politiku za ACK kod i dosadašnji broj pokušaja.
pub fn policy_for(ack: AckCode, attempts_so_far: u32) -> AckPolicy {
    match ack {
        AckCode::Accepted => AckPolicy::Post,
        AckCode::InvalidXml => AckPolicy::DiagnoseXml,
        AckCode::InvalidSignature => AckPolicy::DiagnoseCertificate,
        AckCode::ServerError => {
            if attempts_so_far >= MAX_RETRIES {
                AckPolicy::GiveUp
            } else {
                AckPolicy::Retry {
                    attempt: attempts_so_far + 1,
                    delay_secs: backoff_delay(attempts_so_far).as_secs(),
                }
            }
        }
    }
}

/// Backoff za n-ti pokušaj (0-bazirano): 5, 10, 20, 40, 80 s.
pub fn backoff_delay(attempts_so_far: u32) -> Duration {
    Duration::from_secs(BACKOFF_BASE_SECS << attempts_so_far.min(MAX_RETRIES - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in [10u16, 90, 91, 99] {
            assert_eq!(AckCode::from_code(code).unwrap().code(), code);
        }
        assert!(AckCode::from_code(42).is_none());
    }

    #[test]
    fn accepted_posts() {
        assert_eq!(policy_for(AckCode::Accepted, 0), AckPolicy::Post);
    }

    #[test]
    fn diagnostics_never_retry() {
        assert_eq!(policy_for(AckCode::InvalidXml, 0), AckPolicy::DiagnoseXml);
        assert_eq!(
            policy_for(AckCode::InvalidSignature, 3),
            AckPolicy::DiagnoseCertificate
        );
    }

    #[test]
    fn server_error_backoff_sequence() {
        let expected = [5u64, 10, 20, 40, 80];
        for (attempts, delay) in expected.iter().enumerate() {
            match policy_for(AckCode::ServerError, attempts as u32) {
                AckPolicy::Retry {
                    attempt,
                    delay_secs,
                } => {
                    assert_eq!(attempt, attempts as u32 + 1);
                    assert_eq!(delay_secs, *delay);
                }
                other => panic!("očekivan Retry, dobiven {:?}", other),
            }
        }
        assert_eq!(policy_for(AckCode::ServerError, 5), AckPolicy::GiveUp);
    }
}
