/// Configuration used to drive transaction construction.
#[derive(Debug, Clone)]
pub struct OpenAssetsConfig {
    /// Minimum satoshi value of a non-OP_RETURN output (default: 600).
    pub dust_limit: u64,
}

impl Default for OpenAssetsConfig {
    fn default() -> Self {
        Self { dust_limit: 600 }
    }
}
