//! Tile URI templates
//!
//! A template is copied through verbatim except for placeholders of the
//! form `${name}` or `${name:args}`, where `name` is ASCII letters and
//! `args` runs up to the next `}`. Recognised names:
//!
//! * `level`, `tileX`, `tileY` and the other key fields by name
//! * `pixelRatio`
//! * `modulo:a,b,c` picks `list[tileX % len]`, a stable shard picker
//! * `quadkey`
//!
//! Anything else resolves to `undefined`, which keeps URIs byte-compatible
//! with what existing tile providers were configured against.

use super::key::TileKey;

/// Anything that can produce tile URLs for a given key.
pub trait TileSource {
    fn url(&self, key: &TileKey, pixel_ratio: f64) -> String;
}

/// Placeholder-substituting source
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TemplateSource {
    template: String,
}

impl TemplateSource {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

impl TileSource for TemplateSource {
    fn url(&self, key: &TileKey, pixel_ratio: f64) -> String {
        let template = self.template.as_str();
        let mut out = String::with_capacity(template.len() + 16);
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let candidate = &rest[start..];
            match parse_placeholder(candidate) {
                Some((name, args, consumed)) => {
                    out.push_str(&substitute(key, pixel_ratio, name, args));
                    rest = &candidate[consumed..];
                }
                None => {
                    out.push('$');
                    rest = &candidate[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Parses a placeholder at the start of `text` (which begins with `${`).
/// Returns the name, the optional argument text and the consumed length.
fn parse_placeholder(text: &str) -> Option<(&str, Option<&str>, usize)> {
    let body = &text[2..];
    let name_len = body
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    if name_len == 0 {
        return None;
    }
    let name = &body[..name_len];
    let after = &body[name_len..];

    if after.starts_with('}') {
        return Some((name, None, 2 + name_len + 1));
    }
    let args_text = after.strip_prefix(':')?;
    let close = args_text.find('}')?;
    Some((name, Some(&args_text[..close]), 2 + name_len + 1 + close + 1))
}

fn substitute(key: &TileKey, pixel_ratio: f64, name: &str, args: Option<&str>) -> String {
    match name {
        "quadkey" => key.quadkey(),
        "modulo" => {
            let choices: Vec<&str> = args.unwrap_or("").split(',').collect();
            let index = key.tile_x % choices.len() as i64;
            usize::try_from(index)
                .ok()
                .and_then(|i| choices.get(i))
                .map(|choice| choice.to_string())
                .unwrap_or_else(|| UNDEFINED.to_string())
        }
        "pixelRatio" => {
            let ratio = if pixel_ratio.is_finite() && pixel_ratio != 0.0 {
                pixel_ratio
            } else {
                1.0
            };
            format_number(ratio)
        }
        "level" => key.level.to_string(),
        "tileX" => key.tile_x.to_string(),
        "tileY" => key.tile_y.to_string(),
        "id" => key.id.clone(),
        "res" => format_number(key.res),
        "scaledX" => format_number(key.scaled_x),
        "scaledY" => format_number(key.scaled_y),
        "size" => key.size.to_string(),
        _ => UNDEFINED.to_string(),
    }
}

const UNDEFINED: &str = "undefined";

/// Prints a float the way a script engine prints a number: integral values
/// carry no fractional part.
pub(crate) fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{:.0}", value + 0.0)
    } else {
        format!("{}", value)
    }
}
