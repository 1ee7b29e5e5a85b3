use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use serde::Serialize;

/// Daily-reward streak bookkeeping for one player.
///
/// Mutated only by the engagement service: reset to day 1 when the gap since
/// the last claim exceeds the reset window, incremented on an eligible
/// next-day claim, untouched otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreakRecord {
    /// Day index (unix ms / ms-per-day) of the last successful claim.
    pub last_claim_day: u64,
    pub consecutive_days: u32,
}

impl StreakRecord {
    pub fn first_claim(day: u64) -> Self {
        Self {
            last_claim_day: day,
            consecutive_days: 1,
        }
    }
}

impl Write for StreakRecord {
    fn write(&self, writer: &mut impl BufMut) {
        self.last_claim_day.write(writer);
        self.consecutive_days.write(writer);
    }
}

impl Read for StreakRecord {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            last_claim_day: u64::read(reader)?,
            consecutive_days: u32::read(reader)?,
        })
    }
}

impl EncodeSize for StreakRecord {
    fn encode_size(&self) -> usize {
        self.last_claim_day.encode_size() + self.consecutive_days.encode_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::{DecodeExt, Encode};

    #[test]
    fn test_streak_record_roundtrip() {
        let record = StreakRecord {
            last_claim_day: 19_935,
            consecutive_days: 12,
        };
        let encoded = record.encode();
        let decoded = StreakRecord::decode(&mut &encoded[..]).unwrap();
        assert_eq!(record, decoded);
    }
}
