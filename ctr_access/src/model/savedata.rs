//! Save data access model.
//!
//! The extdata-id and other-user-save-ids fields of the local capability
//! block share their bytes between two encodings. The "extended savedata
//! access" attribute bit selects which one is in use.

use serde::{Deserialize, Serialize};

use ctr_core::error::LocalCapsError;
use ctr_core::Result;

/// Mask of a 20-bit save id.
pub const SAVE_ID_MASK: u32 = 0x000F_FFFF;

/// Number of save ids packed into one 64-bit field.
pub const SAVE_IDS_PER_FIELD: usize = 3;

/// Maximum number of accessible save ids in the extended encoding.
pub const MAX_ACCESSIBLE_SAVE_IDS: usize = 2 * SAVE_IDS_PER_FIELD;

const SAVE_ID_BITS: usize = 20;
const USE_OTHER_VARIATION_BIT: u64 = 1 << 60;

/// Which save data areas a program may touch besides its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveDataAccess {
    /// Extdata id plus up to three other-user save ids.
    Standard {
        extdata_id: u64,
        other_user_save_ids: Vec<u32>,
        use_other_variation: bool,
    },

    /// Up to six accessible save ids.
    Extended { accessible_save_ids: Vec<u32> },
}

impl Default for SaveDataAccess {
    fn default() -> Self {
        Self::Standard {
            extdata_id: 0,
            other_user_save_ids: Vec::new(),
            use_other_variation: false,
        }
    }
}

impl SaveDataAccess {
    /// Build the standard encoding.
    pub fn standard(
        extdata_id: u64,
        other_user_save_ids: &[u32],
        use_other_variation: bool,
    ) -> Result<Self> {
        check_save_ids("other user", other_user_save_ids, SAVE_IDS_PER_FIELD)?;
        Ok(Self::Standard {
            extdata_id,
            other_user_save_ids: trim_trailing_zeros(other_user_save_ids),
            use_other_variation,
        })
    }

    /// Build the extended encoding.
    pub fn extended(accessible_save_ids: &[u32]) -> Result<Self> {
        check_save_ids("accessible", accessible_save_ids, MAX_ACCESSIBLE_SAVE_IDS)?;
        Ok(Self::Extended {
            accessible_save_ids: trim_trailing_zeros(accessible_save_ids),
        })
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, Self::Extended { .. })
    }

    /// All six accessible save id slots, in order. Unused slots are zero, as
    /// is every slot of the standard encoding.
    pub fn accessible_save_id_slots(&self) -> [u32; MAX_ACCESSIBLE_SAVE_IDS] {
        let mut slots = [0u32; MAX_ACCESSIBLE_SAVE_IDS];
        if let Self::Extended { accessible_save_ids } = self {
            for (slot, id) in slots.iter_mut().zip(accessible_save_ids) {
                *slot = *id;
            }
        }
        slots
    }

    /// Encode into the (extdata-id, other-user-save-ids) field pair.
    pub(crate) fn encode(&self) -> (u64, u64) {
        match self {
            Self::Standard {
                extdata_id,
                other_user_save_ids,
                use_other_variation,
            } => {
                let mut other = pack_save_ids(other_user_save_ids);
                if *use_other_variation {
                    other |= USE_OTHER_VARIATION_BIT;
                }
                (*extdata_id, other)
            }
            Self::Extended { accessible_save_ids } => {
                let split = accessible_save_ids.len().min(SAVE_IDS_PER_FIELD);
                let (low_ids, high_ids) = accessible_save_ids.split_at(split);
                (pack_save_ids(high_ids), pack_save_ids(low_ids))
            }
        }
    }

    /// Decode from the (extdata-id, other-user-save-ids) field pair.
    pub(crate) fn decode(extdata_field: u64, other_field: u64, extended: bool) -> Self {
        if extended {
            let mut ids = unpack_save_ids(other_field).to_vec();
            ids.extend(unpack_save_ids(extdata_field));
            Self::Extended {
                accessible_save_ids: trim_trailing_zeros(&ids),
            }
        } else {
            Self::Standard {
                extdata_id: extdata_field,
                other_user_save_ids: trim_trailing_zeros(&unpack_save_ids(other_field)),
                use_other_variation: other_field & USE_OTHER_VARIATION_BIT != 0,
            }
        }
    }
}

/// Pack up to three ids into one field. The first id takes the highest
/// slot, so a short list leaves the low-order slots empty.
fn pack_save_ids(ids: &[u32]) -> u64 {
    ids.iter()
        .take(SAVE_IDS_PER_FIELD)
        .enumerate()
        .fold(0u64, |field, (index, id)| {
            field | (u64::from(id & SAVE_ID_MASK) << slot_shift(index))
        })
}

fn unpack_save_ids(field: u64) -> [u32; SAVE_IDS_PER_FIELD] {
    let mut ids = [0u32; SAVE_IDS_PER_FIELD];
    for (index, id) in ids.iter_mut().enumerate() {
        *id = ((field >> slot_shift(index)) as u32) & SAVE_ID_MASK;
    }
    ids
}

const fn slot_shift(index: usize) -> usize {
    SAVE_ID_BITS * (SAVE_IDS_PER_FIELD - 1 - index)
}

fn trim_trailing_zeros(ids: &[u32]) -> Vec<u32> {
    let len = ids.iter().rposition(|id| *id != 0).map_or(0, |last| last + 1);
    ids[..len].to_vec()
}

fn check_save_ids(kind: &'static str, ids: &[u32], max: usize) -> Result<()> {
    if ids.len() > max {
        return Err(LocalCapsError::TooManySaveIds {
            kind,
            count: ids.len(),
            max,
        }
        .into());
    }
    if let Some(id) = ids.iter().find(|id| **id > SAVE_ID_MASK) {
        return Err(LocalCapsError::SaveIdOutOfRange(*id).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_packs_high_to_low() {
        let access = SaveDataAccess::standard(0x0000_0000_0000_1234, &[0x11111, 0x22222, 0x33333], true)
            .unwrap();
        let (extdata, other) = access.encode();
        assert_eq!(extdata, 0x1234);
        assert_eq!(other, (1 << 60) | (0x11111 << 40) | (0x22222 << 20) | 0x33333);

        assert_eq!(SaveDataAccess::decode(extdata, other, false), access);
    }

    #[test]
    fn test_two_accessible_ids_take_high_slots() {
        let access = SaveDataAccess::extended(&[0x12345, 0x00ABC]).unwrap();
        let (extdata, other) = access.encode();
        assert_eq!(other, (0x12345 << 40) | (0xABC << 20));
        assert_eq!(extdata, 0);

        let decoded = SaveDataAccess::decode(extdata, other, true);
        assert_eq!(
            decoded.accessible_save_id_slots(),
            [0x12345, 0x00ABC, 0, 0, 0, 0]
        );
        assert_eq!(decoded, access);
    }

    #[test]
    fn test_last_three_accessible_ids_use_extdata_field() {
        let ids = [1, 2, 3, 4, 5];
        let access = SaveDataAccess::extended(&ids).unwrap();
        let (extdata, other) = access.encode();
        assert_eq!(other, (1 << 40) | (2 << 20) | 3);
        assert_eq!(extdata, (4 << 40) | (5 << 20));

        let decoded = SaveDataAccess::decode(extdata, other, true);
        assert_eq!(decoded.accessible_save_id_slots(), [1, 2, 3, 4, 5, 0]);
    }

    #[test]
    fn test_limits() {
        assert!(SaveDataAccess::extended(&[1; 7]).is_err());
        assert!(SaveDataAccess::standard(0, &[1; 4], false).is_err());
        assert!(SaveDataAccess::standard(0, &[0x10_0000], false).is_err());
    }

    #[test]
    fn test_standard_has_no_accessible_slots() {
        let access = SaveDataAccess::standard(0xF000_0000_0000_0001, &[7], false).unwrap();
        assert_eq!(access.accessible_save_id_slots(), [0; 6]);
        assert!(!access.is_extended());
    }
}
