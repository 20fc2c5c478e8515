//! Unit and ingredient-name canonicalization.
//!
//! Recipe ingredients and inventory items are named by different people
//! at different times, so every comparison in the engine goes through
//! these functions first. All of them are pure and idempotent;
//! unrecognized input passes through lowercased and trimmed rather than
//! failing.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Canonical unit tokens grouped into closed compatibility classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UnitClass {
    Weight,
    Volume,
    Count,
}

static UNIT_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for syn in ["pc", "pcs", "piece", "pieces"] {
        m.insert(syn, "pieces");
    }
    for syn in ["kg", "kilo", "kilos", "kilogram", "kilograms"] {
        m.insert(syn, "kg");
    }
    for syn in ["g", "gr", "gram", "grams"] {
        m.insert(syn, "g");
    }
    for syn in ["l", "liter", "liters", "litre", "litres"] {
        m.insert(syn, "liters");
    }
    for syn in ["ml", "milliliter", "milliliters", "millilitre", "millilitres"] {
        m.insert(syn, "ml");
    }
    for syn in ["serving", "servings"] {
        m.insert(syn, "serving");
    }
    for syn in ["portion", "portions"] {
        m.insert(syn, "portion");
    }
    for syn in ["scoop", "scoops"] {
        m.insert(syn, "scoop");
    }
    m
});

/// Size and marketing descriptors that appear as name prefixes but carry
/// no identity ("Large Iced Latte" and "Iced Latte" are the same thing
/// for mapping purposes).
const DESCRIPTOR_PREFIXES: &[&str] = &[
    "small", "medium", "large", "regular", "mini", "jumbo", "fresh", "frozen", "premium",
];

fn unit_class(unit: &str) -> Option<UnitClass> {
    match unit {
        "kg" | "g" => Some(UnitClass::Weight),
        "liters" | "ml" => Some(UnitClass::Volume),
        "pieces" | "serving" | "portion" | "scoop" => Some(UnitClass::Count),
        _ => None,
    }
}

/// True for tokens like "500g", "1.5l", "250ml" that encode a pack size.
fn is_size_token(token: &str) -> bool {
    let digits_end = token
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(token.len());
    if digits_end == 0 {
        return false;
    }
    let suffix = &token[digits_end..];
    suffix.is_empty() || UNIT_SYNONYMS.contains_key(suffix)
}

/// Canonicalizes an ingredient or product name for comparison:
/// lowercased, trimmed, leading size/descriptor tokens stripped,
/// whitespace collapsed.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    let mut start = 0;
    while start < tokens.len().saturating_sub(1) {
        let token = tokens[start];
        if DESCRIPTOR_PREFIXES.contains(&token) || is_size_token(token) {
            start += 1;
        } else {
            break;
        }
    }

    let stripped = tokens[start..].join(" ");
    if stripped.is_empty() {
        tokens.join(" ")
    } else {
        stripped
    }
}

/// Canonicalizes a unit string via the synonym table. Unrecognized units
/// are returned lowercased and trimmed.
pub fn normalize_unit(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    match UNIT_SYNONYMS.get(lowered.as_str()) {
        Some(canonical) => (*canonical).to_string(),
        None => lowered,
    }
}

/// Two units are compatible iff they normalize to the same token or fall
/// in the same compatibility class (weight, volume, count).
pub fn units_compatible(a: &str, b: &str) -> bool {
    let a = normalize_unit(a);
    let b = normalize_unit(b);
    if a == b {
        return true;
    }
    match (unit_class(&a), unit_class(&b)) {
        (Some(ca), Some(cb)) => ca == cb,
        _ => false,
    }
}
