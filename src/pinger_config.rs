use crate::icmp::v4::Ttl;
use crate::{PingError, PingResult};
use std::net::Ipv4Addr;
use std::time::Duration;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_RTT: Duration = Duration::from_secs(1);
const DEFAULT_TTL: u8 = 64;

#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PingerConfig {
    /// Time between two probes.
    pub interval: Duration,
    /// A probe without reply after this long is reported as lost.
    pub max_rtt: Duration,
    /// Log per-packet diagnostics at debug level.
    pub debug: bool,
    /// IPv4 address the socket listens on.
    pub listen_address: String,
    pub ttl: u8,
}

impl Default for PingerConfig {
    fn default() -> Self {
        PingerConfig {
            interval: DEFAULT_INTERVAL,
            max_rtt: DEFAULT_MAX_RTT,
            debug: false,
            listen_address: "0.0.0.0".to_string(),
            ttl: DEFAULT_TTL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ValidatedConfig {
    pub interval: Duration,
    pub max_rtt: Duration,
    pub debug: bool,
    pub listen_address: Ipv4Addr,
    pub ttl: Ttl,
}

impl PingerConfig {
    pub(crate) fn validate(&self) -> PingResult<ValidatedConfig> {
        if self.interval.is_zero() {
            return Err(PingError::InvalidConfig("interval must be greater than zero".to_string()));
        }
        if self.max_rtt.is_zero() {
            return Err(PingError::InvalidConfig("max RTT must be greater than zero".to_string()));
        }
        if self.ttl == 0 {
            return Err(PingError::InvalidConfig("TTL must be greater than zero".to_string()));
        }
        let listen_address = self.listen_address.parse::<Ipv4Addr>().map_err(|e| {
            PingError::InvalidConfig(format!("listen address {:?}: {e}", self.listen_address))
        })?;
        Ok(ValidatedConfig {
            interval: self.interval,
            max_rtt: self.max_rtt,
            debug: self.debug,
            listen_address,
            ttl: Ttl(self.ttl),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let validated = PingerConfig::default().validate().unwrap();
        assert_eq!(Ipv4Addr::UNSPECIFIED, validated.listen_address);
        assert_eq!(Ttl(64), validated.ttl);
        assert_eq!(Duration::from_secs(1), validated.interval);
        assert_eq!(Duration::from_secs(1), validated.max_rtt);
        assert!(!validated.debug);
    }

    #[test]
    fn invalid_listen_address_is_rejected() {
        let config = PingerConfig { listen_address: "not-an-address".to_string(), ..PingerConfig::default() };
        assert!(matches!(config.validate(), Err(PingError::InvalidConfig(_))));

        let config = PingerConfig { listen_address: "::1".to_string(), ..PingerConfig::default() };
        assert!(matches!(config.validate(), Err(PingError::InvalidConfig(_))));
    }

    #[test]
    fn zero_values_are_rejected() {
        let zero_interval = PingerConfig { interval: Duration::ZERO, ..PingerConfig::default() };
        let zero_max_rtt = PingerConfig { max_rtt: Duration::ZERO, ..PingerConfig::default() };
        let zero_ttl = PingerConfig { ttl: 0, ..PingerConfig::default() };

        assert!(matches!(zero_interval.validate(), Err(PingError::InvalidConfig(_))));
        assert!(matches!(zero_max_rtt.validate(), Err(PingError::InvalidConfig(_))));
        assert!(matches!(zero_ttl.validate(), Err(PingError::InvalidConfig(_))));
    }
}
