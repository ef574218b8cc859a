//! Standard radio phraseology helpers.
//!
//! Translates identifiers into spoken ICAO form: letters to the phonetic
//! alphabet, digits to spoken numbers ("9" is "niner"), runway idents to
//! "one six right".

/// Phonetic form of an ASCII letter.
pub fn phonetic_letter(letter: char) -> Option<&'static str> {
    Some(match letter.to_ascii_uppercase() {
        'A' => "Alpha",
        'B' => "Bravo",
        'C' => "Charlie",
        'D' => "Delta",
        'E' => "Echo",
        'F' => "Foxtrot",
        'G' => "Golf",
        'H' => "Hotel",
        'I' => "India",
        'J' => "Juliett",
        'K' => "Kilo",
        'L' => "Lima",
        'M' => "Mike",
        'N' => "November",
        'O' => "Oscar",
        'P' => "Papa",
        'Q' => "Quebec",
        'R' => "Romeo",
        'S' => "Sierra",
        'T' => "Tango",
        'U' => "Uniform",
        'V' => "Victor",
        'W' => "Whiskey",
        'X' => "Xray",
        'Y' => "Yankee",
        'Z' => "Zulu",
        _ => return None,
    })
}

/// Spoken form of a digit.
pub fn phonetic_digit(digit: char) -> Option<&'static str> {
    Some(match digit {
        '0' => "zero",
        '1' => "one",
        '2' => "two",
        '3' => "three",
        '4' => "four",
        '5' => "five",
        '6' => "six",
        '7' => "seven",
        '8' => "eight",
        '9' => "niner",
        _ => return None,
    })
}

/// Spell an identifier character by character in phonetic form.
///
/// Unknown characters pass through unchanged.
pub fn spell_ident(ident: &str) -> String {
    ident
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| {
            phonetic_letter(c)
                .or_else(|| phonetic_digit(c))
                .map(str::to_string)
                .unwrap_or_else(|| c.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Spoken form of a runway ident: digits individually, the side suffix as a
/// word ("16R" becomes "one six right").
pub fn runway_phrase(runway: &str) -> String {
    let mut words = Vec::new();
    for c in runway.trim().chars() {
        match c {
            'L' | 'l' => words.push("left".to_string()),
            'R' | 'r' => words.push("right".to_string()),
            'C' | 'c' => words.push("center".to_string()),
            d if d.is_ascii_digit() => {
                if let Some(w) = phonetic_digit(d) {
                    words.push(w.to_string());
                }
            }
            _ => {}
        }
    }
    words.join(" ")
}

/// Comma-separated phonetic list of taxiway names.
pub fn taxiway_list(taxiways: &[String]) -> String {
    taxiways
        .iter()
        .map(|t| spell_ident(t))
        .collect::<Vec<_>>()
        .join(", ")
}
