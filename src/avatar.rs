//! Placeholder avatar generation.
//!
//! Accounts created without a profile picture get a deterministic
//! initials-on-colour placeholder so every user renders with something.
//! The colour hash matches the one the web client has always used, so a
//! user's fallback avatar looks the same everywhere.

/// First letter of each word of the display name, uppercased.
pub fn initials(full_name: &str) -> String {
    full_name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Deterministic colour for a display name, as six lowercase hex digits.
///
/// This is a direct port of the client's `stringToColor`: a 31x rolling
/// hash over the name with 32-bit signed wraparound, then the low three
/// bytes rendered as hex. Wraparound is part of the contract; changing the
/// arithmetic changes everyone's colours.
pub fn name_color(full_name: &str) -> String {
    let mut hash: i32 = 0;
    for c in full_name.chars() {
        hash = (c as i32).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash));
    }
    let mut color = String::with_capacity(6);
    for i in 0..3 {
        let byte = (hash >> (i * 8)) & 0xff;
        color.push_str(&format!("{byte:02x}"));
    }
    color
}

/// Placeholder image URL for a display name.
///
/// Example: `https://dummyimage.com/100x100/7e0001/fff&text=AL`
pub fn placeholder_url(full_name: &str) -> String {
    format!(
        "https://dummyimage.com/100x100/{}/fff&text={}",
        name_color(full_name),
        initials(full_name)
    )
}
