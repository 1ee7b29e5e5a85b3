use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use serde::Serialize;

use crate::constants::MAX_PLAYER_ID_LENGTH;

/// Helper to write a string as length-prefixed UTF-8 bytes.
pub fn write_string(s: &str, writer: &mut impl BufMut) {
    let bytes = s.as_bytes();
    (bytes.len() as u32).write(writer);
    writer.put_slice(bytes);
}

/// Helper to read a string from length-prefixed UTF-8 bytes.
pub fn read_string(reader: &mut impl Buf, max_len: usize) -> Result<String, Error> {
    let len = u32::read(reader)? as usize;
    if len > max_len {
        return Err(Error::Invalid("String", "too long"));
    }
    if reader.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    let mut bytes = vec![0u8; len];
    reader.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| Error::Invalid("String", "invalid UTF-8"))
}

/// Helper to get encode size of a string.
pub fn string_encode_size(s: &str) -> usize {
    4 + s.len()
}

/// Reason codes for ledger mutations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxKind {
    Bet = 0,
    Payout = 1,
    TransferSent = 2,
    TransferReceived = 3,
    DailyReward = 4,
    StreakReward = 5,
    WelcomeBonus = 6,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bet => "BET",
            Self::Payout => "PAYOUT",
            Self::TransferSent => "TRANSFER_SENT",
            Self::TransferReceived => "TRANSFER_RECEIVED",
            Self::DailyReward => "DAILY_REWARD",
            Self::StreakReward => "STREAK_REWARD",
            Self::WelcomeBonus => "WELCOME_BONUS",
        }
    }
}

impl Write for TxKind {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for TxKind {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        match value {
            0 => Ok(Self::Bet),
            1 => Ok(Self::Payout),
            2 => Ok(Self::TransferSent),
            3 => Ok(Self::TransferReceived),
            4 => Ok(Self::DailyReward),
            5 => Ok(Self::StreakReward),
            6 => Ok(Self::WelcomeBonus),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for TxKind {
    const SIZE: usize = 1;
}

/// One record of the append-only transaction log.
///
/// Records are immutable once written. For any player, the chronologically
/// ordered sum of `amount` equals the current balance; `balance_before` and
/// `balance_after` are the denormalized checkpoints around this record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: u64,
    pub player: String,
    pub kind: TxKind,
    /// Signed chip delta (negative for debits).
    pub amount: i64,
    pub balance_before: u64,
    pub balance_after: u64,
    /// Counterparty for transfers, absent otherwise.
    pub related_player: Option<String>,
    /// The paired record id for the two halves of a transfer.
    pub related_tx: Option<u64>,
    pub timestamp_ms: u64,
}

impl Transaction {
    /// Whether the denormalized balances agree with the signed delta.
    pub fn is_balanced(&self) -> bool {
        i128::from(self.balance_before) + i128::from(self.amount)
            == i128::from(self.balance_after)
    }
}

impl Write for Transaction {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.write(writer);
        write_string(&self.player, writer);
        self.kind.write(writer);
        self.amount.write(writer);
        self.balance_before.write(writer);
        self.balance_after.write(writer);
        match &self.related_player {
            Some(related) => {
                true.write(writer);
                write_string(related, writer);
            }
            None => false.write(writer),
        }
        self.related_tx.write(writer);
        self.timestamp_ms.write(writer);
    }
}

impl Read for Transaction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let id = u64::read(reader)?;
        let player = read_string(reader, MAX_PLAYER_ID_LENGTH)?;
        let kind = TxKind::read(reader)?;
        let amount = i64::read(reader)?;
        let balance_before = u64::read(reader)?;
        let balance_after = u64::read(reader)?;
        let related_player = if bool::read(reader)? {
            Some(read_string(reader, MAX_PLAYER_ID_LENGTH)?)
        } else {
            None
        };
        let related_tx = Option::<u64>::read(reader)?;
        let timestamp_ms = u64::read(reader)?;
        Ok(Self {
            id,
            player,
            kind,
            amount,
            balance_before,
            balance_after,
            related_player,
            related_tx,
            timestamp_ms,
        })
    }
}

impl EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        self.id.encode_size()
            + string_encode_size(&self.player)
            + self.kind.encode_size()
            + self.amount.encode_size()
            + self.balance_before.encode_size()
            + self.balance_after.encode_size()
            + 1
            + self
                .related_player
                .as_ref()
                .map_or(0, |related| string_encode_size(related))
            + self.related_tx.encode_size()
            + self.timestamp_ms.encode_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::{DecodeExt, Encode};

    #[test]
    fn test_tx_kind_roundtrip() {
        for kind in [
            TxKind::Bet,
            TxKind::Payout,
            TxKind::TransferSent,
            TxKind::TransferReceived,
            TxKind::DailyReward,
            TxKind::StreakReward,
            TxKind::WelcomeBonus,
        ] {
            let encoded = kind.encode();
            let decoded = TxKind::decode(&mut &encoded[..]).unwrap();
            assert_eq!(kind, decoded);
        }
    }

    #[test]
    fn test_transaction_roundtrip() {
        let tx = Transaction {
            id: 42,
            player: "alice".to_string(),
            kind: TxKind::TransferSent,
            amount: -250,
            balance_before: 1_000,
            balance_after: 750,
            related_player: Some("bob".to_string()),
            related_tx: Some(43),
            timestamp_ms: 1_700_000_000_000,
        };
        let encoded = tx.encode();
        assert_eq!(encoded.len(), tx.encode_size());
        let decoded = Transaction::decode(&mut &encoded[..]).unwrap();
        assert_eq!(tx, decoded);
        assert!(tx.is_balanced());
    }

    #[test]
    fn test_transaction_roundtrip_without_counterparty() {
        let tx = Transaction {
            id: 1,
            player: "carol".to_string(),
            kind: TxKind::Bet,
            amount: -50,
            balance_before: 100,
            balance_after: 50,
            related_player: None,
            related_tx: None,
            timestamp_ms: 0,
        };
        let encoded = tx.encode();
        let decoded = Transaction::decode(&mut &encoded[..]).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn test_unbalanced_transaction_detected() {
        let tx = Transaction {
            id: 1,
            player: "carol".to_string(),
            kind: TxKind::Payout,
            amount: 10,
            balance_before: 100,
            balance_after: 100,
            related_player: None,
            related_tx: None,
            timestamp_ms: 0,
        };
        assert!(!tx.is_balanced());
    }

    #[test]
    fn test_oversized_player_id_rejected() {
        let tx = Transaction {
            id: 1,
            player: "x".repeat(MAX_PLAYER_ID_LENGTH + 1),
            kind: TxKind::Bet,
            amount: -1,
            balance_before: 1,
            balance_after: 0,
            related_player: None,
            related_tx: None,
            timestamp_ms: 0,
        };
        let encoded = tx.encode();
        assert!(Transaction::decode(&mut &encoded[..]).is_err());
    }
}
