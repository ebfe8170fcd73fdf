// # Connectivity Probe Trait
//
// Defines the interface for testing reachability of the active uplink.
//
// ## Implementations
//
// - Sockets and sysfs (Linux): `linkwatch-probe-net` crate
// - Test doubles: scripted reports in the contract tests
//
// ## Usage
//
// ```rust,ignore
// use linkwatch_core::traits::{CheckMask, ConnectivityProbe};
//
// let probe = /* ConnectivityProbe implementation */;
// let report = probe.check("eth0", CheckMask::for_tick(false)).await?;
// if report.router == Some(false) {
//     println!("router unreachable");
// }
// ```

use async_trait::async_trait;
use std::fmt;
use std::ops::BitOr;

/// A single connectivity check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    /// Physical link (carrier) is up
    Link,
    /// Next-hop router answers
    Router,
    /// Something beyond the router answers
    Internet,
    /// System clock is synchronized over NTP
    Ntp,
}

impl Check {
    /// All checks, in evaluation order
    pub const ALL: [Check; 4] = [Check::Link, Check::Router, Check::Internet, Check::Ntp];

    const fn bit(self) -> u8 {
        match self {
            Check::Link => 1 << 0,
            Check::Router => 1 << 1,
            Check::Internet => 1 << 2,
            Check::Ntp => 1 << 3,
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Check::Link => "link",
            Check::Router => "router",
            Check::Internet => "internet",
            Check::Ntp => "ntp",
        };
        f.write_str(name)
    }
}

/// Set of checks requested from the probe for one tick
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CheckMask(u8);

impl CheckMask {
    /// The empty mask
    pub const EMPTY: CheckMask = CheckMask(0);

    /// Build the mask for one stability tick.
    ///
    /// Link, Router and NTP are always requested. Internet is requested
    /// only while connectivity has not been confirmed yet.
    pub fn for_tick(is_connected: bool) -> Self {
        let mut mask = Check::Link | Check::Router;
        mask.insert(Check::Ntp);
        if !is_connected {
            mask.insert(Check::Internet);
        }
        mask
    }

    /// Add a check to the mask
    pub fn insert(&mut self, check: Check) {
        self.0 |= check.bit();
    }

    /// Whether the mask requests `check`
    pub fn contains(&self, check: Check) -> bool {
        self.0 & check.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Raw bit representation (Link=0x1, Router=0x2, Internet=0x4, Ntp=0x8)
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Iterate the requested checks in evaluation order
    pub fn iter(&self) -> impl Iterator<Item = Check> + '_ {
        Check::ALL.into_iter().filter(move |check| self.contains(*check))
    }
}

impl From<Check> for CheckMask {
    fn from(check: Check) -> Self {
        CheckMask(check.bit())
    }
}

impl BitOr for Check {
    type Output = CheckMask;

    fn bitor(self, rhs: Check) -> CheckMask {
        CheckMask(self.bit() | rhs.bit())
    }
}

impl BitOr<Check> for CheckMask {
    type Output = CheckMask;

    fn bitor(self, rhs: Check) -> CheckMask {
        CheckMask(self.0 | rhs.bit())
    }
}

impl BitOr for CheckMask {
    type Output = CheckMask;

    fn bitor(self, rhs: CheckMask) -> CheckMask {
        CheckMask(self.0 | rhs.0)
    }
}

impl fmt::Debug for CheckMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Outcome of one probe invocation
///
/// Each field is `Some(passed)` when the probe ran that check and `None`
/// when it did not report it. Fields outside the requested mask carry no
/// meaning and are never read by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Physical link state
    pub link: Option<bool>,
    /// Next-hop router reachability
    pub router: Option<bool>,
    /// Internet reachability
    pub internet: Option<bool>,
    /// NTP synchronization state
    pub ntp: Option<bool>,
}

impl ProbeReport {
    /// Result for a single check
    pub fn get(&self, check: Check) -> Option<bool> {
        match check {
            Check::Link => self.link,
            Check::Router => self.router,
            Check::Internet => self.internet,
            Check::Ntp => self.ntp,
        }
    }

    /// Record the result for a single check
    pub fn set(&mut self, check: Check, passed: bool) {
        let slot = match check {
            Check::Link => &mut self.link,
            Check::Router => &mut self.router,
            Check::Internet => &mut self.internet,
            Check::Ntp => &mut self.ntp,
        };
        *slot = Some(passed);
    }
}

/// Trait for connectivity probe implementations
///
/// The probe is an observer: it answers the checks it is asked for and
/// nothing else. Counters, thresholds and recovery belong to the
/// `StabilityEngine`.
///
/// # Errors
///
/// `Err` means the probe could not run at all (for instance the interface
/// vanished). A check that ran and failed is `Some(false)` in the report,
/// never an `Err`.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Run the requested checks against `if_name`
    async fn check(&self, if_name: &str, mask: CheckMask) -> Result<ProbeReport, crate::Error>;
}
