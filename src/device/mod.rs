//! The two playlist folders kept in sync

pub mod storage;

pub use storage::Device;

use std::fmt;

/// Which of the two devices a file lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::A, Side::B];

    /// The other device; always the push destination for a change made here
    pub fn opposite(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

/// Device A and device B
#[derive(Debug, Clone)]
pub struct DevicePair {
    a: Device,
    b: Device,
}

impl DevicePair {
    pub fn new(a: Device, b: Device) -> Self {
        Self { a, b }
    }

    pub fn get(&self, side: Side) -> &Device {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        [&self.a, &self.b].into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_opposite_side() {
        assert_eq!(Side::A.opposite(), Side::B);
        assert_eq!(Side::B.opposite(), Side::A);
    }

    #[test]
    fn test_pair_lookup() {
        let pair = DevicePair::new(
            Device::new(Side::A, "PC", PathBuf::from("/pc"), "PC"),
            Device::new(Side::B, "Smartphone", PathBuf::from("/phone"), "PHONE"),
        );
        assert_eq!(pair.get(Side::B).label(), "Smartphone");
        let labels: Vec<&str> = pair.iter().map(|d| d.label()).collect();
        assert_eq!(labels, vec!["PC", "Smartphone"]);
    }
}
