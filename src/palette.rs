use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub name: String,
    pub colour: String,
    pub block_types: Vec<String>,
}

impl Category {
    pub fn new(name: impl Into<String>, colour: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            colour: colour.into(),
            block_types: Vec::new(),
        }
    }

    pub fn push(&mut self, type_id: &str) {
        if !self.block_types.iter().any(|t| t == type_id) {
            self.block_types.push(type_id.to_string());
        }
    }
}

/// Deterministic hue in `0..360` derived from a module name.
pub fn hash_hue(name: &str) -> u16 {
    let mut hash: i64 = 0;
    for unit in name.encode_utf16() {
        let shifted = (hash as i32).wrapping_shl(5) as i64;
        hash = i64::from(unit) + shifted - hash;
    }
    (hash % 360).unsigned_abs() as u16
}

/// `#rrggbb` for `hue` at 60% saturation and 50% lightness.
pub fn hue_to_hex(hue: u16) -> String {
    let h = f64::from(hue) / 360.0;
    let (s, l) = (0.6_f64, 0.5_f64);
    let a = s * l.min(1.0 - l);
    let channel = |n: f64| -> u8 {
        let k = (n + h * 12.0) % 12.0;
        let v = l - a * (k - 3.0).min(9.0 - k).min(1.0).max(-1.0);
        (255.0 * v).round().clamp(0.0, 255.0) as u8
    };
    format!("#{:02x}{:02x}{:02x}", channel(0.0), channel(8.0), channel(4.0))
}

/// Hue of a `#rrggbb` colour. Malformed input yields 0.
pub fn hex_to_hue(hex: &str) -> u16 {
    let digits = hex.trim_start_matches('#');
    let component = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|d| u8::from_str_radix(d, 16).ok())
            .map(|v| f64::from(v) / 255.0)
            .unwrap_or(0.0)
    };
    let (r, g, b) = (component(0..2), component(2..4), component(4..6));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == min {
        return 0;
    }
    let d = max - min;
    let h = if max == r {
        ((g - b) / d + if g < b { 6.0 } else { 0.0 }) / 6.0
    } else if max == g {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };
    (h * 360.0).round() as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hue_is_stable_and_in_range() {
        assert_eq!(hash_hue(""), 0);
        // 'a' = 97
        assert_eq!(hash_hue("a"), 97);
        // 'a' then 'b': 98 + (97 << 5) - 97 = 3105 -> 3105 % 360
        assert_eq!(hash_hue("ab"), 225);
        for name in ["numpy", "requests", "os", "a_very_long_module_name_with_many_parts"] {
            assert!(hash_hue(name) < 360);
            assert_eq!(hash_hue(name), hash_hue(name));
        }
    }

    #[test]
    fn primary_hues_map_to_expected_colours() {
        assert_eq!(hue_to_hex(0), "#cc3333");
        assert_eq!(hue_to_hex(120), "#33cc33");
        assert_eq!(hue_to_hex(240), "#3333cc");
    }

    #[test]
    fn hex_round_trips_through_hue() {
        assert_eq!(hex_to_hue("#cc3333"), 0);
        assert_eq!(hex_to_hue("#33cc33"), 120);
        assert_eq!(hex_to_hue("#3333cc"), 240);
        assert_eq!(hex_to_hue("#8b5cf6"), 258);
        assert_eq!(hex_to_hue("not a colour"), 0);
    }

    #[test]
    fn category_lists_are_deduplicated() {
        let mut category = Category::new("os", "#000000");
        category.push("import_os_getcwd");
        category.push("import_os_getcwd");
        assert_eq!(category.block_types, vec!["import_os_getcwd".to_string()]);
    }
}
