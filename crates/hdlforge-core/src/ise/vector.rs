//! Nine-valued std_logic vectors, as printed by the simulator.

use std::fmt;

/// One std_logic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdLogic {
    /// Uninitialized.
    Uninitialized,
    /// Strong unknown.
    Unknown,
    Zero,
    One,
    /// High impedance.
    HighImpedance,
    /// Weak unknown.
    WeakUnknown,
    /// Weak zero.
    Low,
    /// Weak one.
    High,
    DontCare,
}

impl StdLogic {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'U' => Some(Self::Uninitialized),
            'X' => Some(Self::Unknown),
            '0' => Some(Self::Zero),
            '1' => Some(Self::One),
            'Z' => Some(Self::HighImpedance),
            'W' => Some(Self::WeakUnknown),
            'L' => Some(Self::Low),
            'H' => Some(Self::High),
            '-' => Some(Self::DontCare),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Self::Uninitialized => 'U',
            Self::Unknown => 'X',
            Self::Zero => '0',
            Self::One => '1',
            Self::HighImpedance => 'Z',
            Self::WeakUnknown => 'W',
            Self::Low => 'L',
            Self::High => 'H',
            Self::DontCare => '-',
        }
    }

    /// The two-valued reading, when one exists. Weak values resolve to
    /// their driven level.
    fn as_bit(self) -> Option<bool> {
        match self {
            Self::Zero | Self::Low => Some(false),
            Self::One | Self::High => Some(true),
            _ => None,
        }
    }
}

/// A fixed-width vector of std_logic values, most significant bit first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdLogicVector {
    bits: Vec<StdLogic>,
}

impl StdLogicVector {
    /// Parse a simulator-printed vector, e.g. `1010` or `"00ZZ"`.
    ///
    /// Returns `None` when any character is not a std_logic value.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().trim_matches('"');
        if text.is_empty() {
            return None;
        }
        let bits = text
            .chars()
            .map(StdLogic::from_char)
            .collect::<Option<Vec<_>>>()?;
        Some(Self { bits })
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Bit at an index counted from the least significant end.
    pub fn bit(&self, index: usize) -> Option<StdLogic> {
        if index >= self.bits.len() {
            return None;
        }
        Some(self.bits[self.bits.len() - 1 - index])
    }

    /// The unsigned integer reading, defined only when every bit has a
    /// two-valued interpretation and the width fits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.bits.len() > 64 {
            return None;
        }
        let mut value = 0u64;
        for bit in &self.bits {
            value = (value << 1) | u64::from(bit.as_bit()?);
        }
        Some(value)
    }
}

impl fmt::Display for StdLogicVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.bits {
            write!(f, "{}", bit.to_char())?;
        }
        Ok(())
    }
}
