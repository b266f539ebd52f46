//! Overlay configuration resolved from query parameters
//!
//! `resolve` is pure and total: every query parameter is optional and every
//! malformed value falls back to a documented default.
//!
//! | name     | values                                               | default |
//! |----------|------------------------------------------------------|---------|
//! | `size`   | `small` \| `medium` \| `large` (others passed through) | medium  |
//! | `show`   | comma list of `progress,layers,eta,filename,status,printer` | all but `printer` |
//! | `fps`    | integer, clamped to 1..=30                           | 15      |
//! | `camera` | `false` \| `0` hide the camera, anything else shows it | shown   |

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Default stream frame rate
pub const DEFAULT_FPS: u32 = 15;
/// Lowest accepted stream frame rate
pub const MIN_FPS: u32 = 1;
/// Highest accepted stream frame rate
pub const MAX_FPS: u32 = 30;

/// Known size classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Size {
    /// Compact panel
    Small,
    /// Default panel
    Medium,
    /// Large panel
    Large,
}

impl Size {
    /// Query value for this size
    pub fn as_str(&self) -> &'static str {
        match self {
            Size::Small => "small",
            Size::Medium => "medium",
            Size::Large => "large",
        }
    }
}

/// The `size` parameter as given
///
/// Unrecognized values are kept verbatim; [`SizeParam::style`] decides how
/// they are laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SizeParam {
    /// One of the named sizes
    Known(Size),
    /// Anything else, kept verbatim
    Unrecognized(String),
}

impl SizeParam {
    /// Parse a `size` value; never fails
    pub fn parse(raw: &str) -> Self {
        match raw {
            "small" => SizeParam::Known(Size::Small),
            "medium" => SizeParam::Known(Size::Medium),
            "large" => SizeParam::Known(Size::Large),
            other => SizeParam::Unrecognized(other.to_string()),
        }
    }

    /// Query value, verbatim when unrecognized
    pub fn as_str(&self) -> &str {
        match self {
            SizeParam::Known(size) => size.as_str(),
            SizeParam::Unrecognized(raw) => raw,
        }
    }

    /// Layout lookup; unrecognized sizes get the medium layout
    pub fn style(&self) -> SizeStyle {
        match self {
            SizeParam::Known(Size::Small) => SizeStyle {
                padding_px: 12,
                title_px: 14,
                text_px: 12,
                progress_px: 6,
                logo_px: 24,
            },
            SizeParam::Known(Size::Large) => SizeStyle {
                padding_px: 32,
                title_px: 30,
                text_px: 22,
                progress_px: 14,
                logo_px: 48,
            },
            SizeParam::Known(Size::Medium) | SizeParam::Unrecognized(_) => SizeStyle {
                padding_px: 20,
                title_px: 20,
                text_px: 16,
                progress_px: 10,
                logo_px: 36,
            },
        }
    }
}

impl Default for SizeParam {
    fn default() -> Self {
        SizeParam::Known(Size::Medium)
    }
}

/// Pixel dimensions for one size class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeStyle {
    /// Panel padding
    pub padding_px: u32,
    /// Printer and file name font size
    pub title_px: u32,
    /// Body font size
    pub text_px: u32,
    /// Progress bar height
    pub progress_px: u32,
    /// Logo height
    pub logo_px: u32,
}

/// Fields the status panel may show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayField {
    /// Progress bar
    Progress,
    /// Layer counter
    Layers,
    /// Remaining time and arrival clock
    Eta,
    /// Job file name
    Filename,
    /// Status line
    Status,
    /// Printer name
    Printer,
}

impl OverlayField {
    /// All fields, in the order they are listed in a canonical `show` parameter
    pub const ALL: [OverlayField; 6] = [
        OverlayField::Progress,
        OverlayField::Layers,
        OverlayField::Eta,
        OverlayField::Filename,
        OverlayField::Status,
        OverlayField::Printer,
    ];

    /// Parse one `show` token, ignoring surrounding whitespace
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "progress" => Some(OverlayField::Progress),
            "layers" => Some(OverlayField::Layers),
            "eta" => Some(OverlayField::Eta),
            "filename" => Some(OverlayField::Filename),
            "status" => Some(OverlayField::Status),
            "printer" => Some(OverlayField::Printer),
            _ => None,
        }
    }

    /// Token used in the `show` parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayField::Progress => "progress",
            OverlayField::Layers => "layers",
            OverlayField::Eta => "eta",
            OverlayField::Filename => "filename",
            OverlayField::Status => "status",
            OverlayField::Printer => "printer",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of visible fields
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FieldSet(u8);

impl FieldSet {
    /// Set with no fields
    pub fn empty() -> Self {
        FieldSet(0)
    }

    /// Parse a comma-separated allow-list; unknown tokens are ignored
    pub fn parse(list: &str) -> Self {
        list.split(',')
            .filter_map(OverlayField::parse)
            .fold(FieldSet::empty(), FieldSet::with)
    }

    /// Set with `field` added
    pub fn with(self, field: OverlayField) -> Self {
        FieldSet(self.0 | field.bit())
    }

    /// Whether `field` is in the set
    pub fn contains(&self, field: OverlayField) -> bool {
        self.0 & field.bit() != 0
    }

    /// Whether no field is set
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Fields in display order
    pub fn iter(&self) -> impl Iterator<Item = OverlayField> + '_ {
        OverlayField::ALL
            .into_iter()
            .filter(move |field| self.contains(*field))
    }
}

impl Default for FieldSet {
    /// Everything except the printer name, which is opt-in
    fn default() -> Self {
        [
            OverlayField::Progress,
            OverlayField::Layers,
            OverlayField::Eta,
            OverlayField::Filename,
            OverlayField::Status,
        ]
        .into_iter()
        .fold(FieldSet::empty(), FieldSet::with)
    }
}

impl fmt::Debug for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for FieldSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Display configuration for one overlay view
///
/// Recomputed on every navigation; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayConfig {
    /// Layout size
    pub size: SizeParam,
    /// Optional lines to show
    pub visible_fields: FieldSet,
    /// Camera frame rate, 1..=30
    pub frame_rate: u32,
    /// Whether the camera background is shown
    pub show_camera: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            size: SizeParam::default(),
            visible_fields: FieldSet::default(),
            frame_rate: DEFAULT_FPS,
            show_camera: true,
        }
    }
}

impl OverlayConfig {
    /// Whether `field` is visible
    pub fn shows(&self, field: OverlayField) -> bool {
        self.visible_fields.contains(field)
    }

    /// Canonical query string for this configuration
    pub fn to_query(&self) -> String {
        let show = self
            .visible_fields
            .iter()
            .map(|field| field.as_str())
            .collect::<Vec<_>>()
            .join(",");
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("size", self.size.as_str())
            .append_pair("show", &show)
            .append_pair("fps", &self.frame_rate.to_string())
            .append_pair("camera", if self.show_camera { "true" } else { "false" })
            .finish()
    }
}

/// Resolve a configuration from decoded query parameters
pub fn resolve(params: &HashMap<String, String>) -> OverlayConfig {
    let get = |key: &str| params.get(key).map(String::as_str);
    OverlayConfig {
        size: get("size").map(SizeParam::parse).unwrap_or_default(),
        visible_fields: get("show").map(FieldSet::parse).unwrap_or_default(),
        frame_rate: resolve_frame_rate(get("fps")),
        show_camera: resolve_show_camera(get("camera")),
    }
}

/// Resolve a configuration from a raw query string (with or without leading `?`)
///
/// When a key repeats, its first occurrence wins.
pub fn resolve_query(raw_query: &str) -> OverlayConfig {
    let raw_query = raw_query.strip_prefix('?').unwrap_or(raw_query);
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    resolve(&params)
}

fn resolve_frame_rate(raw: Option<&str>) -> u32 {
    match raw.and_then(parse_int_prefix) {
        Some(fps) => fps.clamp(i64::from(MIN_FPS), i64::from(MAX_FPS)) as u32,
        None => DEFAULT_FPS,
    }
}

/// Leading integer of `raw` (optional sign, then digits), saturating on overflow
fn parse_int_prefix(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    let value = rest[..digits_len].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -value } else { value })
}

fn resolve_show_camera(raw: Option<&str>) -> bool {
    !matches!(raw, Some("false") | Some("0"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fps(query: &str) -> u32 {
        resolve_query(query).frame_rate
    }

    #[test]
    fn frame_rate_is_clamped_or_defaulted() {
        assert_eq!(fps("fps=0"), 1);
        assert_eq!(fps("fps=60"), 30);
        assert_eq!(fps("fps=-5"), 1);
        assert_eq!(fps("fps=abc"), 15);
        assert_eq!(fps("fps="), 15);
        assert_eq!(fps(""), 15);
        assert_eq!(fps("fps=24"), 24);
        assert_eq!(fps("fps=99999999999999999999"), 30);
        assert_eq!(fps("fps=12fps"), 12);
        assert_eq!(fps("fps=%2012"), 12);
    }

    #[test]
    fn absent_show_yields_default_fields() {
        let config = resolve_query("size=large");
        assert!(config.shows(OverlayField::Progress));
        assert!(config.shows(OverlayField::Status));
        assert!(!config.shows(OverlayField::Printer));
    }

    #[test]
    fn show_is_an_allow_list() {
        let config = resolve_query("show=printer,%20eta,bogus");
        let fields: Vec<_> = config.visible_fields.iter().collect();
        assert_eq!(fields, vec![OverlayField::Eta, OverlayField::Printer]);

        assert!(resolve_query("show=").visible_fields.is_empty());
    }

    #[test]
    fn camera_hidden_only_by_false_spellings() {
        assert!(!resolve_query("camera=false").show_camera);
        assert!(!resolve_query("camera=0").show_camera);
        assert!(resolve_query("camera=no").show_camera);
        assert!(resolve_query("camera=FALSE").show_camera);
        assert!(resolve_query("").show_camera);
    }

    #[test]
    fn unknown_size_passes_through_with_medium_layout() {
        let config = resolve_query("size=huge");
        assert_eq!(config.size, SizeParam::Unrecognized("huge".into()));
        assert_eq!(
            config.size.style(),
            SizeParam::Known(Size::Medium).style()
        );
        assert_ne!(
            SizeParam::Known(Size::Small).style(),
            SizeParam::Known(Size::Large).style()
        );
    }

    #[test]
    fn first_occurrence_of_a_key_wins() {
        let config = resolve_query("?fps=5&fps=20&size=small");
        assert_eq!(config.frame_rate, 5);
        assert_eq!(config.size, SizeParam::Known(Size::Small));
    }

    #[test]
    fn canonical_query_resolves_to_same_config() {
        let config = resolve_query("size=small&show=layers,printer&fps=7&camera=0");
        assert_eq!(resolve_query(&config.to_query()), config);
        assert_eq!(
            OverlayConfig::default().to_query(),
            "size=medium&show=progress%2Clayers%2Ceta%2Cfilename%2Cstatus&fps=15&camera=true"
        );
    }
}
