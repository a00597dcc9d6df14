#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// Console model being emulated.
///
/// Selects post-boot register values and whether the CGB-only registers
/// (VRAM/WRAM banking, color palettes, HDMA) are mapped.
pub enum Model {
    #[default]
    Dmg,
    Cgb,
}

impl Model {
    #[inline]
    pub const fn is_cgb(self) -> bool {
        matches!(self, Model::Cgb)
    }
}
