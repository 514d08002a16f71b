//! Camera model profiles: payload offset and frame header width per model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed per-model geometry of the firmware frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    /// Offset where the circular payload area starts
    pub offset: usize,
    /// Width of the physical frame header in bytes
    pub header_len: usize,
}

/// SoC family, determines which buffer file the firmware exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocFamily {
    MStar,
    Allwinner,
    AllwinnerV2,
}

impl SocFamily {
    pub fn buffer_file(&self) -> &'static str {
        match self {
            SocFamily::MStar => "/dev/fshare_frame_buf",
            SocFamily::Allwinner | SocFamily::AllwinnerV2 => "/dev/shm/fshare_frame_buf",
        }
    }
}

/// Supported camera models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    Y203c,
    Y23,
    Y25,
    Y30,
    H201c,
    H305r,
    H307,
    Y20ga,
    Y25ga,
    Y30qa,
    Y501gc,
    Y21ga,
    Y211ga,
    Y213ga,
    Y291ga,
    H30ga,
    R30gb,
    R35gb,
    R40ga,
    H51ga,
    H52ga,
    H60ga,
    Y28ga,
    Y29ga,
    Y623,
    Q321brLsx,
    Qg311r,
    B091qp,
}

impl Default for Model {
    fn default() -> Self {
        Model::Y21ga
    }
}

const OFFSET_MSTAR: usize = 230;
const HEADER_MSTAR: usize = 19;

impl Model {
    pub fn family(&self) -> SocFamily {
        use Model::*;
        match self {
            Y203c | Y23 | Y25 | Y30 | H201c | H305r | H307 => SocFamily::MStar,
            Y20ga | Y25ga | Y30qa | Y501gc => SocFamily::Allwinner,
            Y21ga | Y211ga | Y213ga | Y291ga | H30ga | R30gb | R35gb | R40ga | H51ga | H52ga
            | H60ga | Y28ga | Y29ga | Y623 | Q321brLsx | Qg311r | B091qp => SocFamily::AllwinnerV2,
        }
    }

    pub fn profile(&self) -> Profile {
        use Model::*;
        let (offset, header_len) = match self {
            Y203c | Y23 | Y25 | Y30 | H201c | H305r | H307 => (OFFSET_MSTAR, HEADER_MSTAR),

            Y20ga | Y25ga | Y30qa => (300, 22),
            Y501gc => (368, 24),

            Y21ga | Y211ga | Y213ga | Y291ga | H30ga | H51ga | H52ga | H60ga | Y28ga | Y29ga
            | Y623 => (368, 28),
            R30gb => (300, 22),
            R35gb | R40ga | Q321brLsx | Qg311r | B091qp => (300, 26),
        };
        Profile { offset, header_len }
    }

    pub fn as_str(&self) -> &'static str {
        use Model::*;
        match self {
            Y203c => "y203c",
            Y23 => "y23",
            Y25 => "y25",
            Y30 => "y30",
            H201c => "h201c",
            H305r => "h305r",
            H307 => "h307",
            Y20ga => "y20ga",
            Y25ga => "y25ga",
            Y30qa => "y30qa",
            Y501gc => "y501gc",
            Y21ga => "y21ga",
            Y211ga => "y211ga",
            Y213ga => "y213ga",
            Y291ga => "y291ga",
            H30ga => "h30ga",
            R30gb => "r30gb",
            R35gb => "r35gb",
            R40ga => "r40ga",
            H51ga => "h51ga",
            H52ga => "h52ga",
            H60ga => "h60ga",
            Y28ga => "y28ga",
            Y29ga => "y29ga",
            Y623 => "y623",
            Q321brLsx => "q321br_lsx",
            Qg311r => "qg311r",
            B091qp => "b091qp",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Model::*;
        let model = match s.to_ascii_lowercase().as_str() {
            "y203c" => Y203c,
            "y23" => Y23,
            "y25" => Y25,
            "y30" => Y30,
            "h201c" => H201c,
            "h305r" => H305r,
            "h307" => H307,
            "y20ga" => Y20ga,
            "y25ga" => Y25ga,
            "y30qa" => Y30qa,
            "y501gc" => Y501gc,
            "y21ga" => Y21ga,
            "y211ga" => Y211ga,
            "y213ga" => Y213ga,
            "y291ga" => Y291ga,
            "h30ga" => H30ga,
            "r30gb" => R30gb,
            "r35gb" => R35gb,
            "r40ga" => R40ga,
            "h51ga" => H51ga,
            "h52ga" => H52ga,
            "h60ga" => H60ga,
            "y28ga" => Y28ga,
            "y29ga" => Y29ga,
            "y623" => Y623,
            "q321br_lsx" => Q321brLsx,
            "qg311r" => Qg311r,
            "b091qp" => B091qp,
            other => return Err(format!("unknown camera model: {other}")),
        };
        Ok(model)
    }
}
