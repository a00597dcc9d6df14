use std::fmt;

/// Result of an 8- or 16-bit ALU operation together with the carries it
/// produced. Carries are computed from the operands when the value is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Carried<T> {
    pub result: T,
    pub half_carry: bool,
    pub carry: bool,
}

/// Returns true when adding the low nibbles of `a` and `b` carries into bit 4.
#[inline]
pub fn half_carry(a: u8, b: u8) -> bool {
    (a & 0x0F) + (b & 0x0F) > 0x0F
}

#[inline]
fn half_borrow(a: u8, b: u8, borrow_in: u8) -> bool {
    (a & 0x0F) < (b & 0x0F) + borrow_in
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Register8(pub u8);

impl Register8 {
    #[inline]
    pub fn value(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn set(&mut self, value: u8) {
        self.0 = value;
    }

    /// `self + rhs + carry_in`, wrapping at 8 bits.
    pub fn add(self, rhs: u8, carry_in: bool) -> Carried<u8> {
        let c = carry_in as u8;
        let wide = self.0 as u16 + rhs as u16 + c as u16;
        Carried {
            result: wide as u8,
            half_carry: (self.0 & 0x0F) + (rhs & 0x0F) + c > 0x0F,
            carry: wide > 0xFF,
        }
    }

    /// `self - rhs - borrow_in`, wrapping at 8 bits.
    pub fn sub(self, rhs: u8, borrow_in: bool) -> Carried<u8> {
        let b = borrow_in as u8;
        Carried {
            result: self.0.wrapping_sub(rhs).wrapping_sub(b),
            half_carry: half_borrow(self.0, rhs, b),
            carry: (self.0 as u16) < rhs as u16 + b as u16,
        }
    }

    /// INC semantics: carry is never produced.
    pub fn increment(self) -> Carried<u8> {
        Carried {
            result: self.0.wrapping_add(1),
            half_carry: half_carry(self.0, 1),
            carry: false,
        }
    }

    /// DEC semantics: carry is never produced.
    pub fn decrement(self) -> Carried<u8> {
        Carried {
            result: self.0.wrapping_sub(1),
            half_carry: self.0 & 0x0F == 0,
            carry: false,
        }
    }
}

impl fmt::Display for Register8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

/// A 16-bit register pair. Each half can be accessed on its own and writes
/// through either half are visible in the combined value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Register16 {
    pub high: Register8,
    pub low: Register8,
}

impl Register16 {
    pub fn new(value: u16) -> Self {
        Self {
            high: Register8((value >> 8) as u8),
            low: Register8(value as u8),
        }
    }

    #[inline]
    pub fn value(self) -> u16 {
        ((self.high.0 as u16) << 8) | self.low.0 as u16
    }

    #[inline]
    pub fn set(&mut self, value: u16) {
        self.high.0 = (value >> 8) as u8;
        self.low.0 = value as u8;
    }

    /// 16-bit add as used by `ADD HL,rr`: half carry out of bit 11, carry out
    /// of bit 15.
    pub fn add(self, rhs: u16) -> Carried<u16> {
        let v = self.value();
        let wide = v as u32 + rhs as u32;
        Carried {
            result: wide as u16,
            half_carry: (v & 0x0FFF) + (rhs & 0x0FFF) > 0x0FFF,
            carry: wide > 0xFFFF,
        }
    }

    /// Signed displacement add as used by `ADD SP,e` and `LD HL,SP+e`.
    /// Both carries come from the unsigned low-byte addition.
    pub fn add_signed(self, offset: i8) -> Carried<u16> {
        let v = self.value();
        let low = Register8(v as u8).add(offset as u8, false);
        Carried {
            result: v.wrapping_add(offset as i16 as u16),
            half_carry: low.half_carry,
            carry: low.carry,
        }
    }

    #[inline]
    pub fn increment(&mut self) -> u16 {
        let v = self.value().wrapping_add(1);
        self.set(v);
        v
    }

    #[inline]
    pub fn decrement(&mut self) -> u16 {
        let v = self.value().wrapping_sub(1);
        self.set(v);
        v
    }
}

impl fmt::Display for Register16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.value())
    }
}

/// Offset into the 0xFF00 high page, as used by `LDH` and `LD (C),A`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Address8(pub u8);

impl Address8 {
    #[inline]
    pub fn to_high_page(self) -> Address16 {
        Address16(0xFF00 | self.0 as u16)
    }
}

/// CPU-visible address. Banked regions resolve it to a [`PhysicalAddress`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address16(pub u16);

impl Address16 {
    #[inline]
    pub fn value(self) -> u16 {
        self.0
    }

    /// Offset of this address from the start of `range`.
    #[inline]
    pub fn offset_in(self, range: AddressRange) -> usize {
        (self.0 - range.low) as usize
    }
}

impl fmt::Display for Address16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:04X}", self.0)
    }
}

/// Flat offset into a storage array (ROM image, external RAM, ...).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalAddress(pub usize);

impl PhysicalAddress {
    /// Combine a bank number and an in-bank offset.
    #[inline]
    pub fn banked(bank: usize, bank_size: usize, offset: usize) -> Self {
        Self(bank * bank_size + offset)
    }
}

/// Inclusive address range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddressRange {
    pub low: u16,
    pub high: u16,
}

impl AddressRange {
    pub const fn new(low: u16, high: u16) -> Self {
        Self { low, high }
    }

    #[inline]
    pub fn contains(&self, addr: u16) -> bool {
        addr >= self.low && addr <= self.high
    }

    pub fn len(&self) -> usize {
        (self.high as usize).saturating_sub(self.low as usize) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.high < self.low
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<u16> {
        self.low..=self.high
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:04X}-${:04X}", self.low, self.high)
    }
}
