use crate::error::TransactionError;
use chrono::{DateTime, SubsecRound, Utc};
use ledgerlite_crypto::{try_verify, Wallet};
use serde::{Deserialize, Serialize};

/// Sender of node-generated transfers such as mining rewards. Only a
/// transaction flagged `system` and sent from this account skips signing.
pub const SYSTEM_SENDER: &str = "network";

/// Timestamps are kept at microsecond precision so the text used for
/// signing survives an ISO-8601 round trip through a peer.
pub fn truncate_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Fixed-width rendering used inside signed and hashed content.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// A value transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Assigned by the store; not covered by the signature or block hash
    #[serde(default)]
    pub id: Option<u64>,
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub block_id: Option<u64>,
    /// Exempt from signature checks when sent from [`SYSTEM_SENDER`]
    #[serde(default)]
    pub system: bool,
}

/// The fields a wallet signs. Keys are sorted during canonical encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SigningPayload<'a> {
    pub amount: f64,
    pub recipient: &'a str,
    pub sender: &'a str,
    pub timestamp: String,
}

/// The fields of a transaction that feed the block hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct HashedContent<'a> {
    pub amount: f64,
    pub public_key: Option<&'a str>,
    pub recipient: &'a str,
    pub sender: &'a str,
    pub signature: Option<&'a str>,
    pub system: bool,
    pub timestamp: String,
}

/// Outcome of checking a transaction's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    /// System transaction from [`SYSTEM_SENDER`], nothing to verify
    Exempt,
    /// Signature or public key absent
    Missing,
    Valid,
    /// Well-formed but does not match the payload
    Invalid,
    /// Key or signature could not be decoded
    Malformed(String),
}

impl SignatureCheck {
    pub fn is_acceptable(&self) -> bool {
        matches!(self, SignatureCheck::Exempt | SignatureCheck::Valid)
    }
}

fn check_amount(amount: f64) -> Result<(), TransactionError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(TransactionError::InvalidAmount(amount))
    }
}

impl Transaction {
    /// Unsigned transfer stamped with the current time.
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
    ) -> Result<Self, TransactionError> {
        Self::with_timestamp(sender, recipient, amount, Utc::now())
    }

    pub fn with_timestamp(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, TransactionError> {
        check_amount(amount)?;
        Ok(Self {
            id: None,
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp: truncate_timestamp(timestamp),
            signature: None,
            public_key: None,
            block_id: None,
            system: false,
        })
    }

    /// Exempt transfer from [`SYSTEM_SENDER`] created by the node itself,
    /// e.g. a mining reward.
    pub fn system(recipient: impl Into<String>, amount: f64) -> Result<Self, TransactionError> {
        let mut tx = Self::new(SYSTEM_SENDER, recipient, amount)?;
        tx.system = true;
        Ok(tx)
    }

    /// Only the reserved sender can skip signing; a `system` flag on any
    /// other account's transfer is ignored.
    pub fn is_exempt(&self) -> bool {
        self.system && self.sender == SYSTEM_SENDER
    }

    /// Finite and non-negative.
    pub fn validate_amount(&self) -> Result<(), TransactionError> {
        check_amount(self.amount)
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn signing_payload(&self) -> SigningPayload<'_> {
        SigningPayload {
            amount: self.amount,
            recipient: &self.recipient,
            sender: &self.sender,
            timestamp: format_timestamp(&self.timestamp),
        }
    }

    pub(crate) fn hashed_content(&self) -> HashedContent<'_> {
        HashedContent {
            amount: self.amount,
            public_key: self.public_key.as_deref(),
            recipient: &self.recipient,
            sender: &self.sender,
            signature: self.signature.as_deref(),
            system: self.system,
            timestamp: format_timestamp(&self.timestamp),
        }
    }

    /// Sign with `wallet`, recording its public key. A transaction is signed once.
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        if self.is_signed() {
            return Err(TransactionError::AlreadySigned);
        }
        check_amount(self.amount)?;
        let signature = wallet.sign(&self.signing_payload())?;
        self.public_key = Some(wallet.public_key_string());
        self.signature = Some(signature);
        Ok(())
    }

    pub fn check_signature(&self) -> SignatureCheck {
        if self.is_exempt() {
            return SignatureCheck::Exempt;
        }
        let (Some(signature), Some(public_key)) = (&self.signature, &self.public_key) else {
            return SignatureCheck::Missing;
        };
        if signature.is_empty() || public_key.is_empty() {
            return SignatureCheck::Missing;
        }
        match try_verify(public_key, signature, &self.signing_payload()) {
            Ok(true) => SignatureCheck::Valid,
            Ok(false) => SignatureCheck::Invalid,
            Err(e) => SignatureCheck::Malformed(e.to_string()),
        }
    }

    /// True for exempt transactions and for signatures that verify.
    pub fn verify_signature(&self) -> bool {
        self.check_signature().is_acceptable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_rejects_bad_amounts() {
        assert_eq!(
            Transaction::new("a", "b", -1.0).unwrap_err(),
            TransactionError::InvalidAmount(-1.0)
        );
        assert!(Transaction::new("a", "b", f64::NAN).is_err());
        assert!(Transaction::new("a", "b", f64::INFINITY).is_err());
        assert!(Transaction::new("a", "b", 0.0).is_ok());
    }

    #[test]
    fn test_sign_and_verify() {
        let wallet = Wallet::generate();
        let mut tx = Transaction::new(wallet.address().into_string(), "0xbob", 5.0).unwrap();
        assert_eq!(tx.check_signature(), SignatureCheck::Missing);

        tx.sign(&wallet).unwrap();
        assert_eq!(tx.check_signature(), SignatureCheck::Valid);
        assert_eq!(tx.public_key.as_deref(), Some(wallet.public_key_string().as_str()));
    }

    #[test]
    fn test_cannot_sign_twice() {
        let wallet = Wallet::generate();
        let mut tx = Transaction::new("a", "b", 1.0).unwrap();
        tx.sign(&wallet).unwrap();
        assert_eq!(tx.sign(&wallet), Err(TransactionError::AlreadySigned));
    }

    #[test]
    fn test_mutation_after_signing_is_detected() {
        let wallet = Wallet::generate();
        let mut tx = Transaction::with_timestamp("a", "b", 1.0, fixed_time()).unwrap();
        tx.sign(&wallet).unwrap();

        let mut changed = tx.clone();
        changed.amount = 2.0;
        assert_eq!(changed.check_signature(), SignatureCheck::Invalid);

        let mut changed = tx.clone();
        changed.recipient = "mallory".into();
        assert_eq!(changed.check_signature(), SignatureCheck::Invalid);

        let mut changed = tx.clone();
        changed.timestamp = fixed_time() + chrono::Duration::seconds(1);
        assert_eq!(changed.check_signature(), SignatureCheck::Invalid);

        // ids are outside the signed payload
        let mut changed = tx;
        changed.id = Some(7);
        changed.block_id = Some(2);
        assert_eq!(changed.check_signature(), SignatureCheck::Valid);
    }

    #[test]
    fn test_malformed_key_is_reported() {
        let mut tx = Transaction::new("a", "b", 1.0).unwrap();
        tx.signature = Some("abcd".into());
        tx.public_key = Some("0xnothex".into());
        assert!(matches!(tx.check_signature(), SignatureCheck::Malformed(_)));
        assert!(!tx.verify_signature());
    }

    #[test]
    fn test_system_transactions_are_exempt() {
        let tx = Transaction::system("miner", 50.0).unwrap();
        assert_eq!(tx.sender, SYSTEM_SENDER);
        assert_eq!(tx.check_signature(), SignatureCheck::Exempt);
        assert!(tx.verify_signature());
    }

    #[test]
    fn test_system_flag_on_user_account_is_not_exempt() {
        let victim = Wallet::generate();
        let mut forged = Transaction::new(victim.address().into_string(), "0xattacker", 10.0).unwrap();
        forged.system = true;
        assert!(!forged.is_exempt());
        assert_eq!(forged.check_signature(), SignatureCheck::Missing);

        // signed by someone other than the declared key holder still fails
        let attacker = Wallet::generate();
        forged.signature = Some(attacker.sign(&forged.signing_payload()).unwrap());
        forged.public_key = Some(victim.public_key_string());
        assert_eq!(forged.check_signature(), SignatureCheck::Invalid);
    }

    #[test]
    fn test_validate_amount_after_construction() {
        let mut tx = Transaction::new("a", "b", 1.0).unwrap();
        assert!(tx.validate_amount().is_ok());
        tx.amount = -100.0;
        assert_eq!(tx.validate_amount(), Err(TransactionError::InvalidAmount(-100.0)));
        tx.amount = f64::NAN;
        assert!(tx.validate_amount().is_err());
    }

    #[test]
    fn test_timestamp_survives_json_round_trip() {
        let wallet = Wallet::generate();
        let mut tx = Transaction::new("a", "b", 3.25).unwrap();
        tx.sign(&wallet).unwrap();
        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
        assert!(back.verify_signature());
    }

    #[test]
    fn test_format_timestamp_is_fixed_width() {
        assert_eq!(format_timestamp(&fixed_time()), "2024-03-01T10:00:00.000000Z");
    }
}
