//! Jalali (Persian solar Hijri) calendar arithmetic.
//!
//! Port of the breaks-table variant of the 33-year cycle algorithm (the one
//! used by jalaali-js, which the tracking portal's dates are written against).
//! All functions return `None` for years outside the supported cycle table;
//! every date this service handles falls well inside it.

/// Jalali years at which the length of the 33-year leap cycle changes.
const BREAKS: [i32; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

/// Jalali month names, 1-based month minus one.
pub const PERSIAN_MONTHS: [&str; 12] = [
    "فروردین",
    "اردیبهشت",
    "خرداد",
    "تیر",
    "مرداد",
    "شهریور",
    "مهر",
    "آبان",
    "آذر",
    "دی",
    "بهمن",
    "اسفند",
];

/// Persian weekday names indexed by days-from-Sunday (index 0 = یکشنبه).
/// This matches the JS `Date.getDay()` numbering the upstream site assumes.
pub const PERSIAN_WEEKDAYS: [&str; 7] = [
    "یکشنبه",
    "دوشنبه",
    "سه‌شنبه",
    "چهارشنبه",
    "پنجشنبه",
    "جمعه",
    "شنبه",
];

struct JalCal {
    leap: i32,
    gy: i32,
    march: i32,
}

/// Leap status, Gregorian year and the March day of Farvardin 1 for a
/// Jalali year.
fn jal_cal(jy: i32) -> Option<JalCal> {
    if jy < BREAKS[0] || jy >= BREAKS[BREAKS.len() - 1] {
        return None;
    }

    let gy = jy + 621;
    let mut leap_j = -14;
    let mut jp = BREAKS[0];
    let mut jump = 0;

    for &jm in &BREAKS[1..] {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += jump / 33 * 8 + jump % 33 / 4;
        jp = jm;
    }
    let mut n = jy - jp;

    leap_j += n / 33 * 8 + (n % 33 + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gy / 4 - (gy / 100 + 1) * 3 / 4 - 150;
    let march = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + (jump + 4) / 33 * 33;
    }
    let mut leap = ((n + 1) % 33 - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    Some(JalCal { leap, gy, march })
}

/// Julian day number for a Gregorian date.
fn g2d(gy: i32, gm: i32, gd: i32) -> i32 {
    let d = (gy + (gm - 8) / 6 + 100100) * 1461 / 4 + (153 * ((gm + 9) % 12) + 2) / 5 + gd
        - 34840408;
    d - (gy + 100100 + (gm - 8) / 6) / 100 * 3 / 4 + 752
}

/// Gregorian date for a Julian day number.
fn d2g(jdn: i32) -> (i32, i32, i32) {
    let mut j = 4 * jdn + 139361631;
    j += (4 * jdn + 183187720) / 146097 * 3 / 4 * 4 - 3908;
    let i = j % 1461 / 4 * 5 + 308;
    let gd = i % 153 / 5 + 1;
    let gm = i / 153 % 12 + 1;
    let gy = j / 1461 - 100100 + (8 - gm) / 6;
    (gy, gm, gd)
}

fn j2d(jy: i32, jm: i32, jd: i32) -> Option<i32> {
    let r = jal_cal(jy)?;
    Some(g2d(r.gy, 3, r.march) + (jm - 1) * 31 - jm / 7 * (jm - 7) + jd - 1)
}

fn d2j(jdn: i32) -> Option<(i32, i32, i32)> {
    let (gy, _, _) = d2g(jdn);
    let mut jy = gy - 621;
    let r = jal_cal(jy)?;
    let jdn1f = g2d(gy, 3, r.march);

    let mut k = jdn - jdn1f;
    if k >= 0 {
        if k <= 185 {
            return Some((jy, 1 + k / 31, k % 31 + 1));
        }
        k -= 186;
    } else {
        jy -= 1;
        k += 179;
        if r.leap == 1 {
            k += 1;
        }
    }
    Some((jy, 7 + k / 30, k % 30 + 1))
}

/// Convert a Jalali date to Gregorian `(year, month, day)`.
pub fn jalali_to_gregorian(jy: i32, jm: i32, jd: i32) -> Option<(i32, i32, i32)> {
    Some(d2g(j2d(jy, jm, jd)?))
}

/// Convert a Gregorian date to Jalali `(year, month, day)`.
pub fn gregorian_to_jalali(gy: i32, gm: i32, gd: i32) -> Option<(i32, i32, i32)> {
    d2j(g2d(gy, gm, gd))
}

pub fn is_leap_jalali_year(jy: i32) -> Option<bool> {
    Some(jal_cal(jy)?.leap == 1)
}

/// Number of days in a Jalali month.
#[allow(dead_code)] // exercised by the round-trip tests
pub fn jalali_month_length(jy: i32, jm: i32) -> Option<i32> {
    match jm {
        1..=6 => Some(31),
        7..=11 => Some(30),
        12 => Some(if is_leap_jalali_year(jy)? { 30 } else { 29 }),
        _ => None,
    }
}
