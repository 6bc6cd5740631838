//! Label geometry inference from ZPL markup.
//!
//! The rendering service needs an exact label size, but markup does not always
//! declare one. Resolution order per axis:
//! 1. `^PW` (print width) / `^LL` (label length) dot counts.
//! 2. Furthest `^FO` / `^FT` field origin plus a fixed margin.
//! 3. The 4×6 in default.

use crate::dispatch::models::LabelDimensions;

const MM_PER_INCH: f64 = 25.4;
/// Room left for the element drawn at the furthest field origin.
const FIELD_MARGIN_DOTS: u64 = 200;

/// Infers label dimensions (whole inches) from markup. Never fails.
pub fn infer_dimensions(zpl: &str) -> LabelDimensions {
    let defaults = LabelDimensions::default();
    let density = defaults.density_dpmm;

    if zpl.trim().is_empty() {
        return defaults;
    }

    let upper = zpl.to_ascii_uppercase();

    let mut width = directive_value(&upper, "^PW")
        .filter(|&dots| dots > 0)
        .map(|dots| dots_to_inches(u64::from(dots), density));
    let mut height = directive_value(&upper, "^LL")
        .filter(|&dots| dots > 0)
        .map(|dots| dots_to_inches(u64::from(dots), density));

    if width.is_none() || height.is_none() {
        let (max_x, max_y) = furthest_field_origin(&upper);
        if width.is_none() && max_x > 0 {
            width = Some(dots_to_inches(u64::from(max_x) + FIELD_MARGIN_DOTS, density));
        }
        if height.is_none() && max_y > 0 {
            height = Some(dots_to_inches(u64::from(max_y) + FIELD_MARGIN_DOTS, density));
        }
    }

    LabelDimensions {
        width_inches: width.filter(|&w| w >= 1).unwrap_or(defaults.width_inches),
        height_inches: height.filter(|&h| h >= 1).unwrap_or(defaults.height_inches),
        density_dpmm: density,
    }
}

fn dots_to_inches(dots: u64, density_dpmm: u32) -> u32 {
    (dots as f64 / density_dpmm as f64 / MM_PER_INCH).ceil() as u32
}

/// Leading ASCII digits of `s` as a dot count, plus the byte length consumed.
/// A digit run too large for `u32` is not a usable count.
fn leading_number(s: &str) -> Option<(u32, usize)> {
    let len = s.bytes().take_while(u8::is_ascii_digit).count();
    if len == 0 {
        return None;
    }
    s[..len].parse().ok().map(|n| (n, len))
}

/// First occurrence of `command` immediately followed by a dot count.
fn directive_value(upper: &str, command: &str) -> Option<u32> {
    upper
        .match_indices(command)
        .find_map(|(pos, _)| leading_number(&upper[pos + command.len()..]).map(|(n, _)| n))
}

/// `x,y` right after the command, if both are present.
fn coordinate_pair(rest: &str) -> Option<(u32, u32)> {
    let (x, consumed) = leading_number(rest)?;
    let rest = rest[consumed..].strip_prefix(',')?;
    let (y, _) = leading_number(rest)?;
    Some((x, y))
}

/// Maximum X and maximum Y across every `^FO` and `^FT` directive.
fn furthest_field_origin(upper: &str) -> (u32, u32) {
    ["^FO", "^FT"]
        .iter()
        .flat_map(|cmd| {
            upper
                .match_indices(cmd)
                .filter_map(move |(pos, _)| coordinate_pair(&upper[pos + cmd.len()..]))
        })
        .fold((0, 0), |(mx, my), (x, y)| (mx.max(x), my.max(y)))
}
