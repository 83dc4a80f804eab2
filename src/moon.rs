use chrono::{DateTime, TimeZone, Utc};

/// Mean length of a lunation in days.
pub(crate) const SYNODIC_MONTH_DAYS: f64 = 29.53058867;

const MS_PER_DAY: f64 = 86_400_000.0;

/// A new moon the phase is measured from: 2000-01-06 18:14 UTC.
pub(crate) fn reference_new_moon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 6, 18, 14, 0)
        .single()
        .unwrap_or_default()
}

/// Fraction of the current lunation in [0, 1). 0 is new, 0.5 is full.
pub(crate) fn moon_phase(at: DateTime<Utc>) -> f64 {
    let diff_ms = (at - reference_new_moon()).num_milliseconds() as f64;
    let days = diff_ms / MS_PER_DAY;
    let phase = days.rem_euclid(SYNODIC_MONTH_DAYS) / SYNODIC_MONTH_DAYS;
    // rem_euclid can round up to the modulus itself for tiny negatives
    if phase >= 1.0 {
        0.0
    } else {
        phase
    }
}

/// Signed horizontal offset of the disc that hides the unlit part of a
/// moon of `radius`. Zero at full, a whole radius at new.
pub(crate) fn occluder_offset(phase: f64, radius: f32) -> f32 {
    let p = phase as f32;
    let lit = if p <= 0.5 { p * 2.0 } else { (1.0 - p) * 2.0 };
    let offset = (1.0 - lit) * radius;
    if p < 0.5 {
        offset
    } else {
        -offset
    }
}

pub(crate) fn phase_name(phase: f64) -> &'static str {
    // eight buckets centred on the principal phases
    let bucket = ((phase * 8.0) + 0.5).floor() as i64 % 8;
    match bucket {
        0 => "new moon",
        1 => "waxing crescent",
        2 => "first quarter",
        3 => "waxing gibbous",
        4 => "full moon",
        5 => "waning gibbous",
        6 => "last quarter",
        _ => "waning crescent",
    }
}
