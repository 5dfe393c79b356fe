//! Entering and leaving inequalities of TS 38.331 section 5.5.4.
//!
//! `mn` and `mp` are neighbour and serving RSRP in dBm, `ofn`/`ocn` the
//! frequency and cell offsets in dB, `ml1`/`ml2` the distances to the
//! serving and the candidate satellite in km.

pub fn a4_entering(mn: f64, ofn: f64, ocn: f64, hys: f64, thresh: f64) -> bool {
    mn + ofn + ocn - hys > thresh
}

pub fn a4_leaving(mn: f64, ofn: f64, ocn: f64, hys: f64, thresh: f64) -> bool {
    mn + ofn + ocn + hys < thresh
}

pub fn a5_entering(
    mp: f64,
    mn: f64,
    ofn: f64,
    ocn: f64,
    hys: f64,
    thresh1: f64,
    thresh2: f64,
) -> bool {
    mp + hys < thresh1 && mn + ofn + ocn - hys > thresh2
}

pub fn a5_leaving(
    mp: f64,
    mn: f64,
    ofn: f64,
    ocn: f64,
    hys: f64,
    thresh1: f64,
    thresh2: f64,
) -> bool {
    mp - hys > thresh1 || mn + ofn + ocn + hys < thresh2
}

pub fn d2_entering(ml1: f64, ml2: f64, hys: f64, thresh1: f64, thresh2: f64) -> bool {
    ml1 - hys > thresh1 && ml2 + hys < thresh2
}

pub fn d2_leaving(ml1: f64, ml2: f64, hys: f64, thresh1: f64, thresh2: f64) -> bool {
    ml1 + hys < thresh1 || ml2 - hys > thresh2
}
