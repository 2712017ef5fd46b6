//! Term normalization shared by index construction and lookup.
//!
//! Terms are lowercased, trimmed, inner whitespace collapsed to one space and accents folded
//! (`é` → `e`, `ñ` → `n`, combining marks dropped). Nordic languages treat `å ä ö æ ø` as
//! letters of their own, so for those locales the letters are kept, and decomposed forms such
//! as `a` + U+030A are composed back into `å`.

const NORDIC_LANGUAGES: &[&str] = &["sv", "fi", "da", "nb", "nn", "no", "is"];
const NORDIC_LETTERS: &[char] = &['å', 'ä', 'ö', 'æ', 'ø'];

const COMBINING_RING_ABOVE: char = '\u{030A}';
const COMBINING_DIAERESIS: char = '\u{0308}';

/// Primary language subtag of a locale tag, lowercased (`sv-SE` → `sv`).
#[must_use]
pub fn primary_subtag(locale: &str) -> String {
    locale
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[must_use]
pub fn is_nordic(locale: &str) -> bool {
    NORDIC_LANGUAGES.contains(&primary_subtag(locale).as_str())
}

/// Normalize a search term or dataset term for `locale`.
#[must_use]
pub fn normalize_term(input: &str, locale: &str) -> String {
    let keep_nordic = is_nordic(locale);
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;

    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }

        if is_combining_mark(c) {
            if keep_nordic
                && let Some(prev) = out.chars().next_back()
                && let Some(composed) = compose_nordic(prev, c)
            {
                out.pop();
                out.push(composed);
            }
            continue;
        }

        if pending_space {
            out.push(' ');
            pending_space = false;
        }

        if keep_nordic && NORDIC_LETTERS.contains(&c) {
            out.push(c);
        } else if let Some(folded) = fold_char(c) {
            out.push_str(folded);
        } else {
            out.push(c);
        }
    }

    out
}

fn compose_nordic(base: char, mark: char) -> Option<char> {
    match (base, mark) {
        ('a', COMBINING_RING_ABOVE) => Some('å'),
        ('a', COMBINING_DIAERESIS) => Some('ä'),
        ('o', COMBINING_DIAERESIS) => Some('ö'),
        _ => None,
    }
}

fn is_combining_mark(c: char) -> bool {
    matches!(
        c as u32,
        0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F
    )
}

/// ASCII folding for lowercase Latin letters carrying diacritics.
fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => "e",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => "g",
        'ĥ' | 'ħ' => "h",
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => "i",
        'ĵ' => "j",
        'ķ' => "k",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "l",
        'ñ' | 'ń' | 'ņ' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => "o",
        'œ' => "oe",
        'ŕ' | 'ŗ' | 'ř' => "r",
        'ś' | 'ŝ' | 'ş' | 'š' | 'ș' => "s",
        'ß' => "ss",
        'ţ' | 'ť' | 'ŧ' | 'ț' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => "u",
        'ŵ' => "w",
        'ý' | 'ÿ' | 'ŷ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(folded)
}
