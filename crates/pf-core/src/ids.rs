use core::fmt;
use core::num::NonZeroU32;

/// Position of a parameter, compartment, link or duration group in the
/// graph that owns it.
///
/// Stored as index+1 so `Option<Id>` (e.g. a compartment's group
/// membership) costs no extra space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(NonZeroU32);

impl Id {
    pub fn from_index(index: u32) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index))
    }

    /// 0-based position.
    pub fn index(self) -> u32 {
        self.0.get() - 1
    }

    /// 0-based position for slice access.
    #[inline]
    pub fn idx(self) -> usize {
        self.index() as usize
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

pub type CompartmentId = Id;
pub type LinkId = Id;
pub type ParamId = Id;
pub type GroupId = Id;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_survive_the_offset() {
        for i in [0_u32, 1, 7, 1_000] {
            let id = CompartmentId::from_index(i);
            assert_eq!(id.index(), i);
            assert_eq!(id.idx(), i as usize);
        }
    }

    #[test]
    fn group_membership_is_niche_packed() {
        assert_eq!(
            core::mem::size_of::<GroupId>(),
            core::mem::size_of::<Option<GroupId>>()
        );
    }

    #[test]
    fn display_shows_position() {
        assert_eq!(LinkId::from_index(3).to_string(), "3");
        assert_eq!(format!("{:?}", ParamId::from_index(2)), "#2");
    }
}
