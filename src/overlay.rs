//! Timed promotional text drawn over a finished video.
//!
//! Intervals repeat every `frequency` seconds. Content comes from weighted
//! phrase and advantage pools, placement from weighted presets or fixed
//! coordinates. The plan is rendered as a `drawtext` filter chain.

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::renderer::command::seconds;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub enabled: bool,
    /// Seconds between the starts of consecutive intervals
    pub frequency: f64,
    /// How long each interval shows text
    pub duration: f64,
    pub fade_duration: f64,
    /// When off, text pops in and out without fading
    pub animation: bool,
    pub brand_name: String,
    pub product_name: String,
    pub phrases: Vec<Phrase>,
    /// Each entry is `[main, sub, ...]`; extra elements are ignored
    pub advantages: Vec<Vec<String>>,
    pub content: ContentMix,
    /// Overrides the weight implied by `content`
    pub phrase_weight: Option<u32>,
    pub random_position: bool,
    pub position_presets: BTreeMap<String, PositionPreset>,
    pub position_weights: BTreeMap<String, u32>,
    pub font_dir: PathBuf,
    /// Font sizes per output resolution, keyed `WxH`
    pub font_scaling: BTreeMap<String, FontScale>,
    pub main_title: TextStyle,
    pub sub_title: TextStyle,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: 30.0,
            duration: 4.0,
            fade_duration: 0.5,
            animation: true,
            brand_name: "Brand".to_string(),
            product_name: "Product".to_string(),
            phrases: Vec::new(),
            advantages: Vec::new(),
            content: ContentMix::Mixed,
            phrase_weight: None,
            random_position: true,
            position_presets: BTreeMap::new(),
            position_weights: BTreeMap::new(),
            font_dir: PathBuf::from("fonts"),
            font_scaling: BTreeMap::new(),
            main_title: TextStyle::default(),
            sub_title: TextStyle::default(),
        }
    }
}

impl OverlayConfig {
    /// Chance (out of 100) that an interval shows a phrase rather than an
    /// advantage
    pub fn phrase_weight(&self) -> u32 {
        self.phrase_weight
            .unwrap_or_else(|| self.content.phrase_weight())
            .min(100)
    }

    pub fn effective_fade(&self) -> f64 {
        if self.animation {
            self.fade_duration.max(0.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Phrase {
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub sub: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMix {
    Phrases,
    Advantages,
    #[default]
    Mixed,
}

impl ContentMix {
    pub fn phrase_weight(&self) -> u32 {
        match self {
            ContentMix::Phrases => 100,
            ContentMix::Advantages => 0,
            ContentMix::Mixed => 70,
        }
    }
}

/// A coordinate: a pixel count or a renderer expression/token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PosValue {
    Pixels(i64),
    Expr(String),
}

impl From<&str> for PosValue {
    fn from(value: &str) -> Self {
        PosValue::Expr(value.to_string())
    }
}

impl From<i64> for PosValue {
    fn from(value: i64) -> Self {
        PosValue::Pixels(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PositionPreset {
    pub main_x: PosValue,
    pub main_y: PosValue,
    pub sub_x: PosValue,
    pub sub_y: PosValue,
}

impl Default for PositionPreset {
    fn default() -> Self {
        Self {
            main_x: "(w-text_w)/2".into(),
            main_y: 120.into(),
            sub_x: "(w-text_w)/2".into(),
            sub_y: 180.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct FontScale {
    pub main_size: Option<u32>,
    pub sub_size: Option<u32>,
}

/// Look of one title line. Unset fields fall back to per-title defaults.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub font_file: Option<String>,
    pub font_size: Option<u32>,
    pub font_color: Option<String>,
    pub x: Option<PosValue>,
    pub y: Option<PosValue>,
    pub shadow: Option<Shadow>,
    pub outline: Option<Outline>,
    pub background: Option<TextBox>,
    /// Seconds the line waits after the interval starts
    pub delay: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Shadow {
    pub color: String,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            color: "black".to_string(),
            offset_x: 2,
            offset_y: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Outline {
    pub color: String,
    pub width: u32,
}

impl Default for Outline {
    fn default() -> Self {
        Self {
            color: "black".to_string(),
            width: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TextBox {
    pub color: String,
    pub padding: u32,
}

impl Default for TextBox {
    fn default() -> Self {
        Self {
            color: "orange".to_string(),
            padding: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleRole {
    Main,
    Sub,
}

impl TitleRole {
    fn default_font(&self) -> &'static str {
        match self {
            TitleRole::Main => "PingFang.ttc",
            TitleRole::Sub => "Songti.ttc",
        }
    }

    fn default_size(&self) -> u32 {
        match self {
            TitleRole::Main => 46,
            TitleRole::Sub => 32,
        }
    }

    fn default_color(&self) -> &'static str {
        match self {
            TitleRole::Main => "white",
            TitleRole::Sub => "black",
        }
    }

    fn default_y(&self) -> PosValue {
        match self {
            TitleRole::Main => PosValue::Pixels(120),
            TitleRole::Sub => PosValue::Pixels(180),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Resolved drawtext coordinates for both lines of one interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub preset: Option<String>,
    pub main: (String, String),
    pub sub: (String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayInterval {
    pub start: f64,
    pub end: f64,
    pub main_text: String,
    pub sub_text: String,
    pub placement: Placement,
}

/// `[kF, kF + Sd]` for `k >= 1` while the interval still ends within the
/// video. A frequency or duration that is not a positive finite number
/// yields nothing.
pub fn display_intervals(total: f64, frequency: f64, duration: f64) -> Vec<(f64, f64)> {
    let mut intervals = Vec::new();
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !positive(frequency) || !positive(duration) || !total.is_finite() {
        return intervals;
    }

    let mut k = 1.0;
    loop {
        let start = frequency * k;
        let end = start + duration;
        if end > total {
            break;
        }
        intervals.push((start, end));
        k += 1.0;
    }
    intervals
}

/// Opacity at time `t` for text shown over `[start, end]` with linear fades
/// of `fade` seconds. Fades that meet in the middle form a triangular peak.
pub fn alpha_at(t: f64, start: f64, end: f64, fade: f64) -> f64 {
    if t < start || t > end {
        return 0.0;
    }
    if fade <= 0.0 {
        return 1.0;
    }
    ((t - start) / fade).min((end - t) / fade).clamp(0.0, 1.0)
}

/// The same envelope as [`alpha_at`], as a renderer expression over `t`
pub fn alpha_expression(start: f64, end: f64, fade: f64) -> String {
    let (s, e) = (seconds(start), seconds(end));
    if fade <= 0.0 {
        return format!("if(between(t,{s},{e}),1,0)");
    }
    let f = seconds(fade);
    format!("if(lt(t,{s}),0,if(gt(t,{e}),0,clip(min((t-{s})/{f},({e}-t)/{f}),0,1)))")
}

/// Turn a coordinate token into a drawtext expression
pub fn resolve_position(value: &PosValue, axis: Axis) -> String {
    let centered = match axis {
        Axis::X => "(w-text_w)/2",
        Axis::Y => "(h-text_h)/2",
    };

    let token = match value {
        PosValue::Pixels(px) => return px.to_string(),
        PosValue::Expr(expr) => expr.trim(),
    };

    match (token, axis) {
        ("center", _) => return centered.to_string(),
        ("left", _) => return "50".to_string(),
        ("right", Axis::X) => return "w-text_w-50".to_string(),
        ("right", Axis::Y) => return "h-text_h-50".to_string(),
        _ => {}
    }

    if let Some((sign, offset)) = capture_offset(&CENTER_OFFSET, token) {
        return format!("{}{}{}", centered, sign, offset);
    }
    if let Some((_, offset)) = capture_offset(&WIDTH_OFFSET, token) {
        return format!("w-{}", offset);
    }
    if let Some((_, offset)) = capture_offset(&HEIGHT_OFFSET, token) {
        return format!("h-{}", offset);
    }

    token.to_string()
}

static CENTER_OFFSET: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^center\s*([+-])\s*(\d+)$").ok());
static WIDTH_OFFSET: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^width\s*(-)\s*(\d+)$").ok());
static HEIGHT_OFFSET: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^height\s*(-)\s*(\d+)$").ok());

fn capture_offset(pattern: &Option<Regex>, token: &str) -> Option<(String, u32)> {
    let re = pattern.as_ref()?;
    let caps = re.captures(token)?;
    let offset = caps.get(2)?.as_str().parse().ok()?;
    Some((caps.get(1)?.as_str().to_string(), offset))
}

/// Escape text for a single-quoted drawtext option value
pub fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\u{2019}")
        .replace(':', "\\:")
        .replace('%', "\\%")
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").replace(':', "\\:")
}

pub struct OverlayPlanner<'a> {
    config: &'a OverlayConfig,
}

impl<'a> OverlayPlanner<'a> {
    pub fn new(config: &'a OverlayConfig) -> Self {
        Self { config }
    }

    pub fn intervals(&self, total: f64) -> Vec<(f64, f64)> {
        display_intervals(total, self.config.frequency, self.config.duration)
    }

    /// Pick content and placement for every interval of a `total`-second video
    pub fn plan<R: Rng + ?Sized>(&self, total: f64, rng: &mut R) -> Vec<OverlayInterval> {
        self.intervals(total)
            .into_iter()
            .map(|(start, end)| {
                let (main_text, sub_text) = self.content(rng);
                OverlayInterval {
                    start,
                    end,
                    main_text,
                    sub_text,
                    placement: self.placement(rng),
                }
            })
            .collect()
    }

    fn content<R: Rng + ?Sized>(&self, rng: &mut R) -> (String, String) {
        let cfg = self.config;
        let roll: u32 = rng.gen_range(1..=100);

        let picked = if roll <= cfg.phrase_weight() {
            cfg.phrases
                .choose(rng)
                .map(|p| (p.main.clone(), p.sub.clone()))
        } else {
            cfg.advantages
                .choose(rng)
                .filter(|entry| entry.len() >= 2)
                .map(|entry| (entry[0].clone(), entry[1].clone()))
        };

        picked.unwrap_or_else(|| (cfg.brand_name.clone(), cfg.product_name.clone()))
    }

    fn placement<R: Rng + ?Sized>(&self, rng: &mut R) -> Placement {
        if let Some((name, preset)) = self.weighted_preset(rng) {
            return Placement {
                preset: Some(name),
                main: (
                    resolve_position(&preset.main_x, Axis::X),
                    resolve_position(&preset.main_y, Axis::Y),
                ),
                sub: (
                    resolve_position(&preset.sub_x, Axis::X),
                    resolve_position(&preset.sub_y, Axis::Y),
                ),
            };
        }

        Placement {
            preset: None,
            main: self.fixed_position(&self.config.main_title, TitleRole::Main),
            sub: self.fixed_position(&self.config.sub_title, TitleRole::Sub),
        }
    }

    fn weighted_preset<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(String, PositionPreset)> {
        let cfg = self.config;
        if !cfg.random_position || cfg.position_presets.is_empty() || cfg.position_weights.is_empty() {
            return None;
        }

        let names: Vec<&String> = cfg.position_weights.keys().collect();
        let dist = WeightedIndex::new(cfg.position_weights.values()).ok()?;
        let name = names[dist.sample(rng)];
        let preset = cfg.position_presets.get(name).cloned().unwrap_or_default();
        Some((name.clone(), preset))
    }

    fn fixed_position(&self, style: &TextStyle, role: TitleRole) -> (String, String) {
        let x = style.x.clone().unwrap_or_else(|| "center".into());
        let y = style.y.clone().unwrap_or_else(|| role.default_y());
        (resolve_position(&x, Axis::X), resolve_position(&y, Axis::Y))
    }

    /// Comma-joined drawtext chain for a `width`x`height` video, or `None`
    /// when there is nothing to draw
    pub fn filter(&self, intervals: &[OverlayInterval], width: u32, height: u32) -> Option<String> {
        let scale = self
            .config
            .font_scaling
            .get(&format!("{}x{}", width, height))
            .copied()
            .unwrap_or_default();

        let mut filters = Vec::new();
        for interval in intervals {
            if !interval.main_text.is_empty() {
                filters.push(self.drawtext(
                    &interval.main_text,
                    &self.config.main_title,
                    TitleRole::Main,
                    scale.main_size,
                    &interval.placement.main,
                    interval.start,
                    interval.end,
                ));
            }

            if !interval.sub_text.is_empty() {
                let delay = self.config.sub_title.delay.max(0.0);
                let start = interval.start + delay;
                if start < interval.end {
                    filters.push(self.drawtext(
                        &interval.sub_text,
                        &self.config.sub_title,
                        TitleRole::Sub,
                        scale.sub_size,
                        &interval.placement.sub,
                        start,
                        interval.end,
                    ));
                }
            }
        }

        (!filters.is_empty()).then(|| filters.join(","))
    }

    #[allow(clippy::too_many_arguments)]
    fn drawtext(
        &self,
        text: &str,
        style: &TextStyle,
        role: TitleRole,
        scaled_size: Option<u32>,
        position: &(String, String),
        start: f64,
        end: f64,
    ) -> String {
        let font_file = style.font_file.as_deref().unwrap_or(role.default_font());
        let font_size = scaled_size.or(style.font_size).unwrap_or(role.default_size());
        let font_color = style.font_color.as_deref().unwrap_or(role.default_color());

        let mut params = vec![
            format!("fontfile='{}'", escape_path(&self.font_path(font_file))),
            format!("text='{}'", escape_text(text)),
            format!("fontsize={}", font_size),
            format!("fontcolor={}", font_color),
            format!("x='{}'", position.0),
            format!("y='{}'", position.1),
            format!(
                "alpha='{}'",
                alpha_expression(start, end, self.config.effective_fade())
            ),
            format!("enable='between(t,{},{})'", seconds(start), seconds(end)),
        ];

        if let Some(shadow) = &style.shadow {
            params.push(format!("shadowcolor={}", shadow.color));
            params.push(format!("shadowx={}", shadow.offset_x));
            params.push(format!("shadowy={}", shadow.offset_y));
        }
        if let Some(outline) = &style.outline {
            params.push(format!("bordercolor={}", outline.color));
            params.push(format!("borderw={}", outline.width));
        }
        if let Some(background) = &style.background {
            params.push("box=1".to_string());
            params.push(format!("boxcolor={}", background.color));
            params.push(format!("boxborderw={}", background.padding));
        }

        format!("drawtext={}", params.join(":"))
    }

    /// Absolute font files are used as is; anything else is looked up by
    /// file name in the font directory.
    fn font_path(&self, font_file: &str) -> PathBuf {
        let path = Path::new(font_file);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match path.file_name() {
            Some(name) => self.config.font_dir.join(name),
            None => self.config.font_dir.join(font_file),
        }
    }
}
