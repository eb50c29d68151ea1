use serde::{Deserialize, Serialize};

/// Hard ceiling on download attempts per purchase. Renewal never resets it.
pub const MAX_DOWNLOAD_ATTEMPTS: i32 = 5;

/// License tier for a rendered video. Pricing, output quality and license
/// text are fixed per tier server-side; the client only ever names the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Personal,
    Commercial,
    Premium,
}

/// Fixed configuration of one tier.
#[derive(Debug, Clone, Copy)]
pub struct TierConfig {
    /// Price in minor currency units (cents)
    pub amount_cents: i64,
    pub resolution: &'static str,
    /// Container format of the rendered asset
    pub format: &'static str,
    pub license_text: &'static str,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Commercial => "commercial",
            Self::Premium => "premium",
        }
    }

    pub fn config(&self) -> &'static TierConfig {
        match self {
            Self::Personal => &TierConfig {
                amount_cents: 299,
                resolution: "1280x720",
                format: "mp4",
                license_text: "Personal license: private, non-commercial use of the rendered video.",
            },
            Self::Commercial => &TierConfig {
                amount_cents: 999,
                resolution: "1920x1080",
                format: "mp4",
                license_text: "Commercial license: use in monetized content and client work.",
            },
            Self::Premium => &TierConfig {
                amount_cents: 2499,
                resolution: "3840x2160",
                format: "mov",
                license_text: "Premium license: unrestricted commercial use, broadcast included.",
            },
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Self::Personal),
            "commercial" => Ok(Self::Commercial),
            "premium" => Ok(Self::Premium),
            _ => Err(()),
        }
    }
}

/// Purchase state machine:
/// `pending -> completed` (payment confirmed, terminal for status),
/// `pending -> failed | cancelled` (terminal).
/// A completed purchase only ever mutates its token/expiry/attempt fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// True once no further status transition is allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for PurchaseStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

/// One paid license to download one rendered asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,
    /// Registered-account owner. Exactly one of account_id/email is set.
    pub account_id: Option<String>,
    /// Anonymous (guest checkout) owner email.
    pub email: Option<String>,
    pub tier: Tier,
    /// Derived from the tier table at creation, never from client input
    pub amount_cents: i64,
    pub status: PurchaseStatus,
    /// Rendered asset this purchase licenses
    pub file_id: String,
    /// Current signed download token (regenerated on renewal)
    pub download_token: Option<String>,
    pub download_expires_at: Option<i64>,
    /// Monotonic; counts link exposure, not successful transfers
    pub download_attempts: i32,
    pub max_attempts: i32,
    pub license_sent: bool,
    pub payment_reference: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl Purchase {
    /// Storage locator of the underlying asset for this purchase.
    pub fn resource(&self) -> String {
        format!("renders/{}.{}", self.file_id, self.tier.config().format)
    }

    pub fn attempts_remaining(&self) -> i32 {
        (self.max_attempts - self.download_attempts).max(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchase {
    pub tier: Tier,
    pub file_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Audit row for one download attempt. Analytics only; the allow/deny
/// decision never reads these.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadAttempt {
    pub id: String,
    pub purchase_id: String,
    pub succeeded: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
}

/// Request context captured alongside an attempt.
#[derive(Debug, Clone, Default)]
pub struct AttemptContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_pricing_is_fixed() {
        assert_eq!(Tier::Personal.config().amount_cents, 299);
        assert_eq!(Tier::Commercial.config().amount_cents, 999);
        assert_eq!(Tier::Premium.config().amount_cents, 2499);
    }

    #[test]
    fn test_status_round_trip() {
        for s in ["pending", "completed", "failed", "cancelled"] {
            let parsed: PurchaseStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("refunded".parse::<PurchaseStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!PurchaseStatus::Pending.is_terminal());
        assert!(PurchaseStatus::Completed.is_terminal());
        assert!(PurchaseStatus::Failed.is_terminal());
        assert!(PurchaseStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_attempts_remaining_never_negative() {
        let p = Purchase {
            id: "rz_pur_x".into(),
            account_id: None,
            email: Some("a@b.c".into()),
            tier: Tier::Personal,
            amount_cents: 299,
            status: PurchaseStatus::Completed,
            file_id: "rz_file_x".into(),
            download_token: None,
            download_expires_at: None,
            download_attempts: 7,
            max_attempts: MAX_DOWNLOAD_ATTEMPTS,
            license_sent: false,
            payment_reference: None,
            created_at: 0,
            completed_at: Some(0),
        };
        assert_eq!(p.attempts_remaining(), 0);
    }
}
