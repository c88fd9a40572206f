use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Byte order of multi-byte words inside script and heap resources.
/// Macintosh releases of the later games store them big-endian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Interpreter generations, in release order. Ordering is meaningful: the
/// object layout and several relocation rules are chosen by range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SciVersion {
    Sci0Early,
    Sci0Late,
    Sci01,
    Sci1EgaOnly,
    Sci1Early,
    Sci1Middle,
    Sci1Late,
    Sci11,
    Sci2,
    Sci21Early,
    Sci21Middle,
    Sci21Late,
    Sci3,
}

/// The three object record layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// Header words precede the object body.
    Pre11,
    /// SCI1.1 through SCI2.1: header fields live in the body.
    Sci11,
    /// Selector-group tables.
    Sci3,
}

impl SciVersion {
    pub const ALL: [SciVersion; 13] = [
        SciVersion::Sci0Early,
        SciVersion::Sci0Late,
        SciVersion::Sci01,
        SciVersion::Sci1EgaOnly,
        SciVersion::Sci1Early,
        SciVersion::Sci1Middle,
        SciVersion::Sci1Late,
        SciVersion::Sci11,
        SciVersion::Sci2,
        SciVersion::Sci21Early,
        SciVersion::Sci21Middle,
        SciVersion::Sci21Late,
        SciVersion::Sci3,
    ];

    pub fn layout(self) -> LayoutKind {
        if self <= SciVersion::Sci1Late {
            LayoutKind::Pre11
        } else if self <= SciVersion::Sci21Late {
            LayoutKind::Sci11
        } else {
            LayoutKind::Sci3
        }
    }

    /// SCI1.1 to SCI2.1 store relocated heap pointers relative to the end of
    /// the script resource, so relocation also adds the script size.
    pub fn relocates_past_script(self) -> bool {
        (SciVersion::Sci11..=SciVersion::Sci21Late).contains(&self)
    }

    /// Index of the species variable; superclass, -info- and name follow it.
    pub fn selector_base_index(self) -> usize {
        if self < SciVersion::Sci11 { 0 } else { 5 }
    }

    pub fn name(self) -> &'static str {
        match self {
            SciVersion::Sci0Early => "SCI0_EARLY",
            SciVersion::Sci0Late => "SCI0_LATE",
            SciVersion::Sci01 => "SCI01",
            SciVersion::Sci1EgaOnly => "SCI1_EGA_ONLY",
            SciVersion::Sci1Early => "SCI1_EARLY",
            SciVersion::Sci1Middle => "SCI1_MIDDLE",
            SciVersion::Sci1Late => "SCI1_LATE",
            SciVersion::Sci11 => "SCI1_1",
            SciVersion::Sci2 => "SCI2",
            SciVersion::Sci21Early => "SCI2_1_EARLY",
            SciVersion::Sci21Middle => "SCI2_1_MIDDLE",
            SciVersion::Sci21Late => "SCI2_1_LATE",
            SciVersion::Sci3 => "SCI3",
        }
    }
}

impl fmt::Display for SciVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SciVersion {
    type Err = anyhow::Error;

    /// Accepts `SCI1_1`, `sci1.1`, `1.1`, `sci21_late` style spellings.
    fn from_str(value: &str) -> Result<Self> {
        let lowered = value.trim().to_ascii_lowercase().replace(['.', '-'], "_");
        let key = lowered.strip_prefix("sci").unwrap_or(&lowered);
        let key = key.trim_start_matches('_');
        let version = match key {
            "0_early" | "0" => SciVersion::Sci0Early,
            "0_late" => SciVersion::Sci0Late,
            "01" => SciVersion::Sci01,
            "1_ega_only" | "1_ega" => SciVersion::Sci1EgaOnly,
            "1_early" => SciVersion::Sci1Early,
            "1_middle" => SciVersion::Sci1Middle,
            "1_late" | "1" => SciVersion::Sci1Late,
            "1_1" | "11" => SciVersion::Sci11,
            "2" => SciVersion::Sci2,
            "2_1_early" | "21_early" => SciVersion::Sci21Early,
            "2_1_middle" | "21_middle" => SciVersion::Sci21Middle,
            "2_1_late" | "21_late" | "2_1" | "21" => SciVersion::Sci21Late,
            "3" => SciVersion::Sci3,
            _ => bail!("unknown SCI version '{value}'"),
        };
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_follow_version_ranges() {
        assert_eq!(SciVersion::Sci0Early.layout(), LayoutKind::Pre11);
        assert_eq!(SciVersion::Sci1Late.layout(), LayoutKind::Pre11);
        assert_eq!(SciVersion::Sci11.layout(), LayoutKind::Sci11);
        assert_eq!(SciVersion::Sci21Late.layout(), LayoutKind::Sci11);
        assert_eq!(SciVersion::Sci3.layout(), LayoutKind::Sci3);
    }

    #[test]
    fn script_size_relocation_range() {
        let inside: Vec<_> = SciVersion::ALL
            .iter()
            .copied()
            .filter(|version| version.relocates_past_script())
            .collect();
        assert_eq!(inside.first(), Some(&SciVersion::Sci11));
        assert_eq!(inside.last(), Some(&SciVersion::Sci21Late));
        assert_eq!(inside.len(), 5);
    }

    #[test]
    fn parses_common_spellings() {
        assert_eq!("SCI1_1".parse::<SciVersion>().unwrap(), SciVersion::Sci11);
        assert_eq!("sci1.1".parse::<SciVersion>().unwrap(), SciVersion::Sci11);
        assert_eq!("2.1_late".parse::<SciVersion>().unwrap(), SciVersion::Sci21Late);
        assert_eq!("sci0_late".parse::<SciVersion>().unwrap(), SciVersion::Sci0Late);
        assert_eq!("3".parse::<SciVersion>().unwrap(), SciVersion::Sci3);
        assert!("sci4".parse::<SciVersion>().is_err());
        for version in SciVersion::ALL {
            assert_eq!(version.name().parse::<SciVersion>().unwrap(), version);
        }
    }
}
