//! The networks a seeder can crawl.

use std::fmt;

/// An enum describing the possible network choices.
///
/// Each network has its own seed peers, default port, and peer cache.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// The production mainnet.
    #[default]
    Mainnet,

    /// The oldest public test network.
    Testnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Mainnet => "Mainnet",
            Network::Testnet => "Testnet",
        })
    }
}

impl Network {
    /// Get the default port associated to this network.
    pub fn default_port(&self) -> u16 {
        match self {
            Network::Mainnet => 8233,
            Network::Testnet => 18233,
        }
    }

    /// Returns the lowercase network name, used for the peer cache directory.
    pub fn lowercase_name(&self) -> String {
        self.to_string().to_ascii_lowercase()
    }
}
