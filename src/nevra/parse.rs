//! NEVRA parsing.
//!
//! The epoch may appear either after the name (`firefox-1:76.0.1-1.fc31.x86_64`)
//! or in front of the whole identifier (`1:firefox-76.0.1-1.fc31.x86_64`).
//! A missing epoch is stored as 0.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use super::NevraError;

lazy_static! {
    static ref NEVRA_RE: Regex = Regex::new(
        r"^(?:(?P<e1>[0-9]+):)?(?P<name>[^:]+)-(?:(?P<e2>[0-9]+):)?(?P<ver>[^-:]+)-(?P<rel>[^-:]*)\.(?P<arch>[a-z0-9_]+)$"
    )
    .unwrap();
}

/// A parsed package identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nevra {
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl Nevra {
    /// Parse a formatted package identifier.
    ///
    /// # Examples
    /// ```
    /// use hostsync_core::nevra::Nevra;
    /// let nevra = Nevra::parse("firefox-1:76.0.1-1.fc31.x86_64").unwrap();
    /// assert_eq!(nevra.name, "firefox");
    /// assert_eq!(nevra.epoch, 1);
    /// ```
    pub fn parse(nevra: &str) -> Result<Self, NevraError> {
        let caps = NEVRA_RE
            .captures(nevra)
            .ok_or_else(|| NevraError::Parse(nevra.to_string()))?;

        let epoch = match caps.name("e1").or_else(|| caps.name("e2")) {
            Some(e) => e.as_str().parse::<u32>().map_err(|_| NevraError::Epoch {
                nevra: nevra.to_string(),
                epoch: e.as_str().to_string(),
            })?,
            None => 0,
        };

        let field = |name: &str| {
            caps.name(name)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };

        Ok(Nevra {
            name: field("name"),
            epoch,
            version: field("ver"),
            release: field("rel"),
            arch: field("arch"),
        })
    }

    /// `[epoch:]version-release`, epoch omitted when zero.
    pub fn evr_string(&self) -> String {
        if self.epoch != 0 {
            format!("{}:{}-{}", self.epoch, self.version, self.release)
        } else {
            format!("{}-{}", self.version, self.release)
        }
    }

    /// `[epoch:]version-release.arch`, epoch omitted when zero.
    pub fn evra_string(&self) -> String {
        format!("{}.{}", self.evr_string(), self.arch)
    }
}

impl FromStr for Nevra {
    type Err = NevraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Nevra::parse(s)
    }
}

impl fmt::Display for Nevra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.evra_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_epoch() {
        let nevra = Nevra::parse("389-ds-base-0:1.3.7-1.fc27.src").unwrap();
        assert_eq!(nevra.name, "389-ds-base");
        assert_eq!(nevra.epoch, 0);
        assert_eq!(nevra.version, "1.3.7");
        assert_eq!(nevra.release, "1.fc27");
        assert_eq!(nevra.arch, "src");
    }

    #[test]
    fn test_parse_without_epoch() {
        let nevra = Nevra::parse("kernel-5.6.13-200.fc31.x86_64").unwrap();
        assert_eq!(nevra.name, "kernel");
        assert_eq!(nevra.epoch, 0);
        assert_eq!(nevra.version, "5.6.13");
        assert_eq!(nevra.release, "200.fc31");
        assert_eq!(nevra.arch, "x86_64");
    }

    #[test]
    fn test_parse_leading_epoch() {
        let nevra = Nevra::parse("2:vim-enhanced-8.2.2637-20.el9.x86_64").unwrap();
        assert_eq!(nevra.name, "vim-enhanced");
        assert_eq!(nevra.epoch, 2);
        assert_eq!(nevra.version, "8.2.2637");
    }

    #[test]
    fn test_parse_empty_release() {
        let nevra =
            Nevra::parse("connectwisecontrol-1330664eb22f9e21-0:21.14.5924.8013-.noarch").unwrap();
        assert_eq!(nevra.name, "connectwisecontrol-1330664eb22f9e21");
        assert_eq!(nevra.epoch, 0);
        assert_eq!(nevra.version, "21.14.5924.8013");
        assert_eq!(nevra.release, "");
        assert_eq!(nevra.arch, "noarch");
    }

    #[test]
    fn test_parse_dashed_name() {
        let nevra = Nevra::parse("rh-ruby24-rubygems-2.6.14.4-92.el7.noarch").unwrap();
        assert_eq!(nevra.name, "rh-ruby24-rubygems");
        assert_eq!(nevra.version, "2.6.14.4");
        assert_eq!(nevra.release, "92.el7");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(Nevra::parse("kernel"), Err(NevraError::Parse(_))));
        assert!(Nevra::parse("kernel-5.6.13").is_err());
        assert!(Nevra::parse("").is_err());
        assert!(Nevra::parse("kernel-5.6.13-200.fc31.X86").is_err());
    }

    #[test]
    fn test_parse_epoch_overflow() {
        let err = Nevra::parse("kernel-99999999999:5.6.13-200.fc31.x86_64").unwrap_err();
        assert!(matches!(err, NevraError::Epoch { .. }));
    }

    #[test]
    fn test_display_round_trip() {
        let nevra = Nevra::parse("firefox-1:76.0.1-1.fc31.x86_64").unwrap();
        assert_eq!(nevra.to_string(), "firefox-1:76.0.1-1.fc31.x86_64");
        assert_eq!(nevra.evr_string(), "1:76.0.1-1.fc31");

        let nevra: Nevra = "firefox-0:76.0.1-1.fc31.x86_64".parse().unwrap();
        assert_eq!(nevra.to_string(), "firefox-76.0.1-1.fc31.x86_64");
        assert_eq!(nevra.evra_string(), "76.0.1-1.fc31.x86_64");
    }
}
