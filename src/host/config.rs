use crate::att::{DEFAULT_MTU, MAX_MTU};

/// Resource limits and protocol parameters of the stack. All capacities are
/// fixed at startup.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Config {
    /// Discovered attribute entries cached across all client connections.
    pub client_entries: usize,
    /// Outbound packet buffers.
    pub tx_bufs: usize,
    /// Services that may be declared on the local server.
    pub max_services: usize,
    /// Client characteristic configuration records across all connections.
    pub max_client_cfgs: usize,
    /// Attributes in the local server table.
    pub max_attrs: usize,
    /// MTU requested from peers. Clamped to the range permitted by ATT.
    pub preferred_mtu: u16,
}

impl Config {
    /// Parses a JSON configuration. Missing fields take their default values.
    #[cfg(feature = "json")]
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        let mut cfg: Self = serde_json::from_str(s)?;
        cfg.preferred_mtu = cfg.mtu();
        Ok(cfg)
    }

    /// Returns the preferred MTU clamped to the range permitted by ATT.
    #[inline]
    #[must_use]
    pub fn mtu(&self) -> u16 {
        self.preferred_mtu.clamp(DEFAULT_MTU, MAX_MTU)
    }

    /// Returns the size of the largest PDU that the stack will transmit.
    #[inline]
    #[must_use]
    pub fn max_pdu_len(&self) -> usize {
        usize::from(self.mtu())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_entries: 128,
            tx_bufs: 16,
            max_services: 32,
            max_client_cfgs: 256,
            max_attrs: 1024,
            preferred_mtu: 247,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "json")]
    #[test]
    fn from_json() {
        let cfg = Config::from_json(r#"{"client_entries": 8, "preferred_mtu": 10}"#).unwrap();
        assert_eq!(cfg.client_entries, 8);
        assert_eq!(cfg.preferred_mtu, DEFAULT_MTU);
        assert_eq!(cfg.max_services, Config::default().max_services);
        let cfg = Config::from_json(r#"{"preferred_mtu": 1024}"#).unwrap();
        assert_eq!(cfg.preferred_mtu, MAX_MTU);
        assert!(Config::from_json(r#"{"tx_bufs": "x"}"#).is_err());
    }

    #[test]
    fn max_pdu_len() {
        let mut cfg = Config::default();
        assert_eq!(cfg.max_pdu_len(), 247);
        cfg.preferred_mtu = 0;
        assert_eq!(cfg.max_pdu_len(), usize::from(DEFAULT_MTU));
        cfg.preferred_mtu = u16::MAX;
        assert_eq!(cfg.mtu(), MAX_MTU);
        assert_eq!(cfg.max_pdu_len(), usize::from(MAX_MTU));
    }
}
