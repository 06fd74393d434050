bitflags::bitflags! {
    /// Flag register of a call frame.
    ///
    /// `CMP` sets both bits; conditional prefixes ([`crate::CondCode`]) test
    /// them.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Flags: u8 {
        /// The compared values were equal.
        const EQUAL = 0b0000_0001;
        /// The left operand was strictly less than the right one.
        const LESS = 0b0000_0010;
    }
}
