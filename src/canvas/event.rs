//! Packing and unpacking for the canvas drawing-event wire format (spec §6).

use crate::codec::{Reader, Writer};
use crate::error::{BridgeError, Result};
use crate::lock::LockStrategy;

/// Fill rule passed to `fill()`/`clip()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    NonZero = 0,
    EvenOdd = 1,
}

impl FillRule {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::NonZero),
            1 => Ok(Self::EvenOdd),
            _ => Err(BridgeError::BadEvent {
                reason: "unknown fill rule",
            }),
        }
    }
}

/// `drawImage` overload selector (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawImageVariant {
    /// `(image, dx, dy)`
    Simple,
    /// `(image, dx, dy, dw, dh)`
    Scaled,
    /// `(image, sx, sy, sw, sh, dx, dy, dw, dh)`
    Cropped,
}

impl DrawImageVariant {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Simple),
            1 => Ok(Self::Scaled),
            2 => Ok(Self::Cropped),
            _ => Err(BridgeError::BadEvent {
                reason: "unknown drawImage variant",
            }),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Simple => 0,
            Self::Scaled => 1,
            Self::Cropped => 2,
        }
    }

    fn param_count(self) -> usize {
        match self {
            Self::Simple => 2,
            Self::Scaled => 4,
            Self::Cropped => 8,
        }
    }
}

/// Gradient kind, with the argument arity fixed per spec.md §9(c).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientKind {
    Linear,
    Conic,
    Radial,
}

impl GradientKind {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Linear),
            1 => Ok(Self::Conic),
            2 => Ok(Self::Radial),
            _ => Err(BridgeError::BadEvent {
                reason: "unknown gradient type",
            }),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Linear => 0,
            Self::Conic => 1,
            Self::Radial => 2,
        }
    }

    fn arg_count(self) -> usize {
        match self {
            Self::Linear => 4,
            Self::Conic => 3,
            Self::Radial => 6,
        }
    }
}

/// One `(offset, color)` stop in a [`Gradient`].
#[derive(Debug, Clone, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: String,
}

/// A gradient sub-record, embedded in `FillStyle`/`StrokeStyle` payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub kind: GradientKind,
    pub args: Vec<f32>,
    pub stops: Vec<GradientStop>,
}

/// Fill/stroke style value: either a plain color string or a gradient.
#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Color(String),
    Gradient(Gradient),
}

/// A drawing event, minus its `canvas_id` (carried separately in [`Event`]).
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    // --- Lifecycle ---
    Create { w: i16, h: i16 },
    Remove,
    Width(i16),
    Height(i16),
    Commit,
    ConnectionClosed,

    // --- Stateful setters ---
    LineWidth(f32),
    MiterLimit(f32),
    LineDashOffset(f32),
    ShadowBlur(f32),
    ShadowOffsetX(f32),
    ShadowOffsetY(f32),
    GlobalAlpha(f32),
    LineCap(u8),
    LineJoin(u8),
    TextAlign(u8),
    TextBaseline(u8),
    Direction(u8),
    FontKerning(u8),
    FontStretch(u8),
    FontVariantCaps(u8),
    TextRendering(u8),
    GlobalCompositeOperation(u8),
    SetLineDash(Vec<f32>),
    Font(String),
    LetterSpacing(String),
    WordSpacing(String),
    ShadowColor(String),
    Filter(String),
    ImageSmoothingEnabled(bool),
    FillStyle(Paint),
    StrokeStyle(Paint),

    // --- Draw operations ---
    ClearRect { x: i16, y: i16, w: i16, h: i16 },
    FillRect { x: i16, y: i16, w: i16, h: i16 },
    StrokeRect { x: i16, y: i16, w: i16, h: i16 },
    Rect { x: i16, y: i16, w: i16, h: i16 },
    MoveTo { x: i16, y: i16 },
    LineTo { x: i16, y: i16 },
    BezierCurveTo {
        cp1x: i16,
        cp1y: i16,
        cp2x: i16,
        cp2y: i16,
        x: i16,
        y: i16,
    },
    QuadraticCurveTo { cpx: i16, cpy: i16, x: i16, y: i16 },
    Arc {
        x: i16,
        y: i16,
        r: i16,
        start_angle: f32,
        end_angle: f32,
        ccw: bool,
    },
    ArcTo {
        x1: i16,
        y1: i16,
        x2: i16,
        y2: i16,
        r: i16,
    },
    Ellipse {
        x: i16,
        y: i16,
        rx: i16,
        ry: i16,
        rotation: f32,
        start_angle: f32,
        end_angle: f32,
        ccw: bool,
    },
    RoundRect {
        x: i16,
        y: i16,
        w: i16,
        h: i16,
        radii: Vec<u16>,
    },
    FillText {
        text: String,
        x: i16,
        y: i16,
        max_width: Option<i16>,
    },
    StrokeText {
        text: String,
        x: i16,
        y: i16,
        max_width: Option<i16>,
    },
    BeginPath,
    ClosePath,
    Fill(FillRule),
    Stroke,
    Clip(FillRule),
    Save,
    Restore,
    Reset,
    ResetTransform,
    Rotate(f32),
    Scale { x: f32, y: f32 },
    Translate { x: f32, y: f32 },
    Transform {
        m11: f32,
        m12: f32,
        m21: f32,
        m22: f32,
        m31: f32,
        m32: f32,
    },
    SetTransform {
        m11: f32,
        m12: f32,
        m21: f32,
        m22: f32,
        m31: f32,
        m32: f32,
    },
    CreateImage { id: u16, codec: u8, bytes: Vec<u8> },
    DrawImage {
        variant: DrawImageVariant,
        id: u16,
        params: Vec<i16>,
    },
}

/// A complete canvas event record: `(type, canvas_id, payload)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub canvas_id: u16,
    pub kind: EventKind,
}

mod opcode {
    pub const CREATE: u8 = 0;
    pub const REMOVE: u8 = 1;
    pub const WIDTH: u8 = 2;
    pub const HEIGHT: u8 = 3;
    pub const COMMIT: u8 = 4;
    pub const CONNECTION_CLOSED: u8 = 5;
    pub const LINE_WIDTH: u8 = 6;
    pub const MITER_LIMIT: u8 = 7;
    pub const LINE_DASH_OFFSET: u8 = 8;
    pub const SHADOW_BLUR: u8 = 9;
    pub const SHADOW_OFFSET_X: u8 = 10;
    pub const SHADOW_OFFSET_Y: u8 = 11;
    pub const GLOBAL_ALPHA: u8 = 12;
    pub const LINE_CAP: u8 = 13;
    pub const LINE_JOIN: u8 = 14;
    pub const TEXT_ALIGN: u8 = 15;
    pub const TEXT_BASELINE: u8 = 16;
    pub const DIRECTION: u8 = 17;
    pub const FONT_KERNING: u8 = 18;
    pub const FONT_STRETCH: u8 = 19;
    pub const FONT_VARIANT_CAPS: u8 = 20;
    pub const TEXT_RENDERING: u8 = 21;
    pub const GLOBAL_COMPOSITE_OPERATION: u8 = 22;
    pub const SET_LINE_DASH: u8 = 23;
    pub const FONT: u8 = 24;
    pub const LETTER_SPACING: u8 = 25;
    pub const WORD_SPACING: u8 = 26;
    pub const SHADOW_COLOR: u8 = 27;
    pub const FILTER: u8 = 28;
    pub const IMAGE_SMOOTHING_ENABLED: u8 = 29;
    pub const FILL_STYLE: u8 = 30;
    pub const STROKE_STYLE: u8 = 31;
    pub const CLEAR_RECT: u8 = 32;
    pub const FILL_RECT: u8 = 33;
    pub const STROKE_RECT: u8 = 34;
    pub const RECT: u8 = 35;
    pub const MOVE_TO: u8 = 36;
    pub const LINE_TO: u8 = 37;
    pub const BEZIER_CURVE_TO: u8 = 38;
    pub const QUADRATIC_CURVE_TO: u8 = 39;
    pub const ARC: u8 = 40;
    pub const ARC_TO: u8 = 41;
    pub const ELLIPSE: u8 = 42;
    pub const ROUND_RECT: u8 = 43;
    pub const FILL_TEXT: u8 = 44;
    pub const STROKE_TEXT: u8 = 45;
    pub const BEGIN_PATH: u8 = 46;
    pub const CLOSE_PATH: u8 = 47;
    pub const FILL: u8 = 48;
    pub const STROKE: u8 = 49;
    pub const CLIP: u8 = 50;
    pub const SAVE: u8 = 51;
    pub const RESTORE: u8 = 52;
    pub const RESET: u8 = 53;
    pub const RESET_TRANSFORM: u8 = 54;
    pub const ROTATE: u8 = 55;
    pub const SCALE: u8 = 56;
    pub const TRANSLATE: u8 = 57;
    pub const TRANSFORM: u8 = 58;
    pub const SET_TRANSFORM: u8 = 59;
    pub const CREATE_IMAGE: u8 = 60;
    pub const DRAW_IMAGE: u8 = 61;
}

const PAINT_COLOR: u8 = 0;
const PAINT_GRADIENT: u8 = 1;

impl Event {
    /// Packs this event onto `writer` as `(type, canvas_id, payload)`.
    pub fn pack<S: LockStrategy>(&self, writer: &mut Writer<'_, S>) -> Result<()> {
        writer.write_u8(self.opcode())?;
        writer.write_u16(self.canvas_id)?;
        self.pack_payload(writer)
    }

    fn opcode(&self) -> u8 {
        use opcode::*;
        match &self.kind {
            EventKind::Create { .. } => CREATE,
            EventKind::Remove => REMOVE,
            EventKind::Width(_) => WIDTH,
            EventKind::Height(_) => HEIGHT,
            EventKind::Commit => COMMIT,
            EventKind::ConnectionClosed => CONNECTION_CLOSED,
            EventKind::LineWidth(_) => LINE_WIDTH,
            EventKind::MiterLimit(_) => MITER_LIMIT,
            EventKind::LineDashOffset(_) => LINE_DASH_OFFSET,
            EventKind::ShadowBlur(_) => SHADOW_BLUR,
            EventKind::ShadowOffsetX(_) => SHADOW_OFFSET_X,
            EventKind::ShadowOffsetY(_) => SHADOW_OFFSET_Y,
            EventKind::GlobalAlpha(_) => GLOBAL_ALPHA,
            EventKind::LineCap(_) => LINE_CAP,
            EventKind::LineJoin(_) => LINE_JOIN,
            EventKind::TextAlign(_) => TEXT_ALIGN,
            EventKind::TextBaseline(_) => TEXT_BASELINE,
            EventKind::Direction(_) => DIRECTION,
            EventKind::FontKerning(_) => FONT_KERNING,
            EventKind::FontStretch(_) => FONT_STRETCH,
            EventKind::FontVariantCaps(_) => FONT_VARIANT_CAPS,
            EventKind::TextRendering(_) => TEXT_RENDERING,
            EventKind::GlobalCompositeOperation(_) => GLOBAL_COMPOSITE_OPERATION,
            EventKind::SetLineDash(_) => SET_LINE_DASH,
            EventKind::Font(_) => FONT,
            EventKind::LetterSpacing(_) => LETTER_SPACING,
            EventKind::WordSpacing(_) => WORD_SPACING,
            EventKind::ShadowColor(_) => SHADOW_COLOR,
            EventKind::Filter(_) => FILTER,
            EventKind::ImageSmoothingEnabled(_) => IMAGE_SMOOTHING_ENABLED,
            EventKind::FillStyle(_) => FILL_STYLE,
            EventKind::StrokeStyle(_) => STROKE_STYLE,
            EventKind::ClearRect { .. } => CLEAR_RECT,
            EventKind::FillRect { .. } => FILL_RECT,
            EventKind::StrokeRect { .. } => STROKE_RECT,
            EventKind::Rect { .. } => RECT,
            EventKind::MoveTo { .. } => MOVE_TO,
            EventKind::LineTo { .. } => LINE_TO,
            EventKind::BezierCurveTo { .. } => BEZIER_CURVE_TO,
            EventKind::QuadraticCurveTo { .. } => QUADRATIC_CURVE_TO,
            EventKind::Arc { .. } => ARC,
            EventKind::ArcTo { .. } => ARC_TO,
            EventKind::Ellipse { .. } => ELLIPSE,
            EventKind::RoundRect { .. } => ROUND_RECT,
            EventKind::FillText { .. } => FILL_TEXT,
            EventKind::StrokeText { .. } => STROKE_TEXT,
            EventKind::BeginPath => BEGIN_PATH,
            EventKind::ClosePath => CLOSE_PATH,
            EventKind::Fill(_) => FILL,
            EventKind::Stroke => STROKE,
            EventKind::Clip(_) => CLIP,
            EventKind::Save => SAVE,
            EventKind::Restore => RESTORE,
            EventKind::Reset => RESET,
            EventKind::ResetTransform => RESET_TRANSFORM,
            EventKind::Rotate(_) => ROTATE,
            EventKind::Scale { .. } => SCALE,
            EventKind::Translate { .. } => TRANSLATE,
            EventKind::Transform { .. } => TRANSFORM,
            EventKind::SetTransform { .. } => SET_TRANSFORM,
            EventKind::CreateImage { .. } => CREATE_IMAGE,
            EventKind::DrawImage { .. } => DRAW_IMAGE,
        }
    }

    fn pack_payload<S: LockStrategy>(&self, w: &mut Writer<'_, S>) -> Result<()> {
        match &self.kind {
            EventKind::Create { w: cw, h } => {
                w2(w, *cw)?;
                w2(w, *h)
            }
            EventKind::Remove
            | EventKind::Commit
            | EventKind::ConnectionClosed
            | EventKind::BeginPath
            | EventKind::ClosePath
            | EventKind::Stroke
            | EventKind::Save
            | EventKind::Restore
            | EventKind::Reset
            | EventKind::ResetTransform => Ok(()),
            EventKind::Width(v) | EventKind::Height(v) => w2(w, *v),
            EventKind::LineWidth(v)
            | EventKind::MiterLimit(v)
            | EventKind::LineDashOffset(v)
            | EventKind::ShadowBlur(v)
            | EventKind::ShadowOffsetX(v)
            | EventKind::ShadowOffsetY(v)
            | EventKind::GlobalAlpha(v)
            | EventKind::Rotate(v) => w.write_f32(*v),
            EventKind::LineCap(v)
            | EventKind::LineJoin(v)
            | EventKind::TextAlign(v)
            | EventKind::TextBaseline(v)
            | EventKind::Direction(v)
            | EventKind::FontKerning(v)
            | EventKind::FontStretch(v)
            | EventKind::FontVariantCaps(v)
            | EventKind::TextRendering(v)
            | EventKind::GlobalCompositeOperation(v) => w.write_u8(*v),
            EventKind::SetLineDash(dashes) => {
                let mut bytes = Vec::with_capacity(dashes.len() * 4);
                for d in dashes {
                    bytes.extend_from_slice(&d.to_be_bytes());
                }
                w.write_bytes(&bytes)
            }
            EventKind::Font(s)
            | EventKind::LetterSpacing(s)
            | EventKind::WordSpacing(s)
            | EventKind::ShadowColor(s)
            | EventKind::Filter(s) => w.write_string(s),
            EventKind::ImageSmoothingEnabled(v) => w.write_u8(if *v { 1 } else { 0 }),
            EventKind::FillStyle(paint) | EventKind::StrokeStyle(paint) => pack_paint(w, paint),
            EventKind::ClearRect { x, y, w: rw, h }
            | EventKind::FillRect { x, y, w: rw, h }
            | EventKind::StrokeRect { x, y, w: rw, h }
            | EventKind::Rect { x, y, w: rw, h } => {
                w2(w, *x)?;
                w2(w, *y)?;
                w2(w, *rw)?;
                w2(w, *h)
            }
            EventKind::MoveTo { x, y } | EventKind::LineTo { x, y } => {
                w2(w, *x)?;
                w2(w, *y)
            }
            EventKind::BezierCurveTo {
                cp1x,
                cp1y,
                cp2x,
                cp2y,
                x,
                y,
            } => {
                for v in [cp1x, cp1y, cp2x, cp2y, x, y] {
                    w2(w, *v)?;
                }
                Ok(())
            }
            EventKind::QuadraticCurveTo { cpx, cpy, x, y } => {
                for v in [cpx, cpy, x, y] {
                    w2(w, *v)?;
                }
                Ok(())
            }
            EventKind::Arc {
                x,
                y,
                r,
                start_angle,
                end_angle,
                ccw,
            } => {
                w2(w, *x)?;
                w2(w, *y)?;
                w2(w, *r)?;
                w.write_f32(*start_angle)?;
                w.write_f32(*end_angle)?;
                w.write_u8(if *ccw { 1 } else { 0 })
            }
            EventKind::ArcTo { x1, y1, x2, y2, r } => {
                for v in [x1, y1, x2, y2, r] {
                    w2(w, *v)?;
                }
                Ok(())
            }
            EventKind::Ellipse {
                x,
                y,
                rx,
                ry,
                rotation,
                start_angle,
                end_angle,
                ccw,
            } => {
                for v in [x, y, rx, ry] {
                    w2(w, *v)?;
                }
                w.write_f32(*rotation)?;
                w.write_f32(*start_angle)?;
                w.write_f32(*end_angle)?;
                w.write_u8(if *ccw { 1 } else { 0 })
            }
            EventKind::RoundRect { x, y, w: rw, h, radii } => {
                if radii.is_empty() || radii.len() > 4 {
                    return Err(BridgeError::BadEvent {
                        reason: "RoundRect radii count must be in 1..=4",
                    });
                }
                w2(w, *x)?;
                w2(w, *y)?;
                w2(w, *rw)?;
                w2(w, *h)?;
                w.write_u8(radii.len() as u8)?;
                for r in radii {
                    w.write_u16(*r)?;
                }
                Ok(())
            }
            EventKind::FillText { text, x, y, max_width }
            | EventKind::StrokeText { text, x, y, max_width } => {
                w.write_u8(if max_width.is_some() { 1 } else { 0 })?;
                w.write_string(text)?;
                w2(w, *x)?;
                w2(w, *y)?;
                if let Some(mw) = max_width {
                    w2(w, *mw)?;
                }
                Ok(())
            }
            EventKind::Fill(rule) | EventKind::Clip(rule) => w.write_u8(*rule as u8),
            EventKind::Scale { x, y } | EventKind::Translate { x, y } => {
                w.write_f32(*x)?;
                w.write_f32(*y)
            }
            EventKind::Transform {
                m11,
                m12,
                m21,
                m22,
                m31,
                m32,
            }
            | EventKind::SetTransform {
                m11,
                m12,
                m21,
                m22,
                m31,
                m32,
            } => {
                for v in [m11, m12, m21, m22, m31, m32] {
                    w.write_f32(*v)?;
                }
                Ok(())
            }
            EventKind::CreateImage { id, codec, bytes } => {
                w.write_u16(*id)?;
                w.write_u8(*codec)?;
                w.write_bytes(bytes)
            }
            EventKind::DrawImage { variant, id, params } => {
                if params.len() != variant.param_count() {
                    return Err(BridgeError::BadEvent {
                        reason: "drawImage parameter count does not match its variant",
                    });
                }
                w.write_u8(variant.as_u8())?;
                w.write_u16(*id)?;
                for p in params {
                    w2(w, *p)?;
                }
                Ok(())
            }
        }
    }

    /// Unpacks one event from `reader`: `(type, canvas_id, payload)`.
    pub fn unpack<S: LockStrategy>(reader: &mut Reader<'_, S>) -> Result<Self> {
        let op = reader.read_u8()?;
        let canvas_id = reader.read_u16()?;
        let kind = unpack_payload(op, reader)?;
        Ok(Event { canvas_id, kind })
    }
}

fn w2<S: LockStrategy>(w: &mut Writer<'_, S>, v: i16) -> Result<()> {
    w.write_i16(v)
}

fn r2<S: LockStrategy>(r: &mut Reader<'_, S>) -> Result<i16> {
    r.read_i16()
}

fn pack_paint<S: LockStrategy>(w: &mut Writer<'_, S>, paint: &Paint) -> Result<()> {
    match paint {
        Paint::Color(s) => {
            w.write_u8(PAINT_COLOR)?;
            w.write_string(s)
        }
        Paint::Gradient(g) => {
            w.write_u8(PAINT_GRADIENT)?;
            if g.args.len() != g.kind.arg_count() {
                return Err(BridgeError::BadEvent {
                    reason: "gradient argument count does not match its type",
                });
            }
            w.write_u8(g.kind.as_u8())?;
            w.write_u8(g.stops.len() as u8)?;
            for a in &g.args {
                w.write_f32(*a)?;
            }
            for stop in &g.stops {
                w.write_f32(stop.offset)?;
                w.write_string(&stop.color)?;
            }
            Ok(())
        }
    }
}

fn unpack_paint<S: LockStrategy>(r: &mut Reader<'_, S>) -> Result<Paint> {
    match r.read_u8()? {
        PAINT_COLOR => Ok(Paint::Color(r.read_string()?)),
        PAINT_GRADIENT => {
            let kind = GradientKind::from_u8(r.read_u8()?)?;
            let stop_count = r.read_u8()? as usize;
            let mut args = Vec::with_capacity(kind.arg_count());
            for _ in 0..kind.arg_count() {
                args.push(r.read_f32()?);
            }
            let mut stops = Vec::with_capacity(stop_count);
            for _ in 0..stop_count {
                let offset = r.read_f32()?;
                let color = r.read_string()?;
                stops.push(GradientStop { offset, color });
            }
            Ok(Paint::Gradient(Gradient { kind, args, stops }))
        }
        _ => Err(BridgeError::BadEvent {
            reason: "unknown paint variant",
        }),
    }
}

fn unpack_payload<S: LockStrategy>(op: u8, r: &mut Reader<'_, S>) -> Result<EventKind> {
    use opcode::*;
    Ok(match op {
        CREATE => EventKind::Create {
            w: r2(r)?,
            h: r2(r)?,
        },
        REMOVE => EventKind::Remove,
        WIDTH => EventKind::Width(r2(r)?),
        HEIGHT => EventKind::Height(r2(r)?),
        COMMIT => EventKind::Commit,
        CONNECTION_CLOSED => EventKind::ConnectionClosed,
        LINE_WIDTH => EventKind::LineWidth(r.read_f32()?),
        MITER_LIMIT => EventKind::MiterLimit(r.read_f32()?),
        LINE_DASH_OFFSET => EventKind::LineDashOffset(r.read_f32()?),
        SHADOW_BLUR => EventKind::ShadowBlur(r.read_f32()?),
        SHADOW_OFFSET_X => EventKind::ShadowOffsetX(r.read_f32()?),
        SHADOW_OFFSET_Y => EventKind::ShadowOffsetY(r.read_f32()?),
        GLOBAL_ALPHA => EventKind::GlobalAlpha(r.read_f32()?),
        LINE_CAP => EventKind::LineCap(r.read_u8()?),
        LINE_JOIN => EventKind::LineJoin(r.read_u8()?),
        TEXT_ALIGN => EventKind::TextAlign(r.read_u8()?),
        TEXT_BASELINE => EventKind::TextBaseline(r.read_u8()?),
        DIRECTION => EventKind::Direction(r.read_u8()?),
        FONT_KERNING => EventKind::FontKerning(r.read_u8()?),
        FONT_STRETCH => EventKind::FontStretch(r.read_u8()?),
        FONT_VARIANT_CAPS => EventKind::FontVariantCaps(r.read_u8()?),
        TEXT_RENDERING => EventKind::TextRendering(r.read_u8()?),
        GLOBAL_COMPOSITE_OPERATION => EventKind::GlobalCompositeOperation(r.read_u8()?),
        SET_LINE_DASH => {
            let bytes = r.read_bytes()?;
            if bytes.len() % 4 != 0 {
                return Err(BridgeError::BadEvent {
                    reason: "dash array byte length is not a multiple of 4",
                });
            }
            let dashes = bytes
                .chunks_exact(4)
                .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            EventKind::SetLineDash(dashes)
        }
        FONT => EventKind::Font(r.read_string()?),
        LETTER_SPACING => EventKind::LetterSpacing(r.read_string()?),
        WORD_SPACING => EventKind::WordSpacing(r.read_string()?),
        SHADOW_COLOR => EventKind::ShadowColor(r.read_string()?),
        FILTER => EventKind::Filter(r.read_string()?),
        IMAGE_SMOOTHING_ENABLED => EventKind::ImageSmoothingEnabled(r.read_u8()? != 0),
        FILL_STYLE => EventKind::FillStyle(unpack_paint(r)?),
        STROKE_STYLE => EventKind::StrokeStyle(unpack_paint(r)?),
        _ => return unpack_rest(op, r),
    })
}

// `ClearRect`/`FillRect`/`StrokeRect`/`Rect` and everything below share this
// function only because `unpack_payload` above already handles every opcode
// whose payload is a single scalar or string; these remaining ones all have
// multi-field or variable-length payloads spelled out individually.
fn unpack_rest<S: LockStrategy>(op: u8, r: &mut Reader<'_, S>) -> Result<EventKind> {
    use opcode::*;
    Ok(match op {
        CLEAR_RECT => EventKind::ClearRect {
            x: r2(r)?,
            y: r2(r)?,
            w: r2(r)?,
            h: r2(r)?,
        },
        FILL_RECT => EventKind::FillRect {
            x: r2(r)?,
            y: r2(r)?,
            w: r2(r)?,
            h: r2(r)?,
        },
        STROKE_RECT => EventKind::StrokeRect {
            x: r2(r)?,
            y: r2(r)?,
            w: r2(r)?,
            h: r2(r)?,
        },
        RECT => EventKind::Rect {
            x: r2(r)?,
            y: r2(r)?,
            w: r2(r)?,
            h: r2(r)?,
        },
        MOVE_TO => EventKind::MoveTo {
            x: r2(r)?,
            y: r2(r)?,
        },
        LINE_TO => EventKind::LineTo {
            x: r2(r)?,
            y: r2(r)?,
        },
        BEZIER_CURVE_TO => EventKind::BezierCurveTo {
            cp1x: r2(r)?,
            cp1y: r2(r)?,
            cp2x: r2(r)?,
            cp2y: r2(r)?,
            x: r2(r)?,
            y: r2(r)?,
        },
        QUADRATIC_CURVE_TO => EventKind::QuadraticCurveTo {
            cpx: r2(r)?,
            cpy: r2(r)?,
            x: r2(r)?,
            y: r2(r)?,
        },
        ARC => EventKind::Arc {
            x: r2(r)?,
            y: r2(r)?,
            r: r2(r)?,
            start_angle: r.read_f32()?,
            end_angle: r.read_f32()?,
            ccw: r.read_u8()? != 0,
        },
        ARC_TO => EventKind::ArcTo {
            x1: r2(r)?,
            y1: r2(r)?,
            x2: r2(r)?,
            y2: r2(r)?,
            r: r2(r)?,
        },
        ELLIPSE => EventKind::Ellipse {
            x: r2(r)?,
            y: r2(r)?,
            rx: r2(r)?,
            ry: r2(r)?,
            rotation: r.read_f32()?,
            start_angle: r.read_f32()?,
            end_angle: r.read_f32()?,
            ccw: r.read_u8()? != 0,
        },
        ROUND_RECT => {
            let x = r2(r)?;
            let y = r2(r)?;
            let w = r2(r)?;
            let h = r2(r)?;
            let n = r.read_u8()?;
            if !(1..=4).contains(&n) {
                return Err(BridgeError::BadEvent {
                    reason: "RoundRect radii count must be in 1..=4",
                });
            }
            let mut radii = Vec::with_capacity(n as usize);
            for _ in 0..n {
                radii.push(r.read_u16()?);
            }
            EventKind::RoundRect { x, y, w, h, radii }
        }
        FILL_TEXT | STROKE_TEXT => {
            let variant = r.read_u8()?;
            if variant > 1 {
                return Err(BridgeError::BadEvent {
                    reason: "FillText/StrokeText variant must be 0 or 1",
                });
            }
            let text = r.read_string()?;
            let x = r2(r)?;
            let y = r2(r)?;
            let max_width = if variant == 1 { Some(r2(r)?) } else { None };
            if op == FILL_TEXT {
                EventKind::FillText { text, x, y, max_width }
            } else {
                EventKind::StrokeText { text, x, y, max_width }
            }
        }
        BEGIN_PATH => EventKind::BeginPath,
        CLOSE_PATH => EventKind::ClosePath,
        FILL => EventKind::Fill(FillRule::from_u8(r.read_u8()?)?),
        STROKE => EventKind::Stroke,
        CLIP => EventKind::Clip(FillRule::from_u8(r.read_u8()?)?),
        SAVE => EventKind::Save,
        RESTORE => EventKind::Restore,
        RESET => EventKind::Reset,
        RESET_TRANSFORM => EventKind::ResetTransform,
        ROTATE => EventKind::Rotate(r.read_f32()?),
        SCALE => EventKind::Scale {
            x: r.read_f32()?,
            y: r.read_f32()?,
        },
        TRANSLATE => EventKind::Translate {
            x: r.read_f32()?,
            y: r.read_f32()?,
        },
        TRANSFORM => EventKind::Transform {
            m11: r.read_f32()?,
            m12: r.read_f32()?,
            m21: r.read_f32()?,
            m22: r.read_f32()?,
            m31: r.read_f32()?,
            m32: r.read_f32()?,
        },
        SET_TRANSFORM => EventKind::SetTransform {
            m11: r.read_f32()?,
            m12: r.read_f32()?,
            m21: r.read_f32()?,
            m22: r.read_f32()?,
            m31: r.read_f32()?,
            m32: r.read_f32()?,
        },
        CREATE_IMAGE => EventKind::CreateImage {
            id: r.read_u16()?,
            codec: r.read_u8()?,
            bytes: r.read_bytes()?.to_vec(),
        },
        DRAW_IMAGE => {
            let variant = DrawImageVariant::from_u8(r.read_u8()?)?;
            let id = r.read_u16()?;
            let mut params = Vec::with_capacity(variant.param_count());
            for _ in 0..variant.param_count() {
                params.push(r2(r)?);
            }
            EventKind::DrawImage { variant, id, params }
        }
        _ => {
            return Err(BridgeError::BadEvent {
                reason: "unknown canvas event opcode",
            })
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bip_stream::BipStream;
    use crate::lock::Busy;

    fn roundtrip(events: &[Event]) -> Vec<Event> {
        let stream = BipStream::create(256).unwrap();
        let (producer, consumer) = stream.split();
        let mut writer = Writer::new(producer, Busy);
        let mut reader = Reader::new(consumer, Busy);
        for e in events {
            e.pack(&mut writer).unwrap();
        }
        events.iter().map(|_| Event::unpack(&mut reader).unwrap()).collect()
    }

    #[test]
    fn lifecycle_and_simple_draw_roundtrip() {
        let events = vec![
            Event {
                canvas_id: 1,
                kind: EventKind::Create { w: 100, h: 100 },
            },
            Event {
                canvas_id: 1,
                kind: EventKind::FillStyle(Paint::Color("red".into())),
            },
            Event {
                canvas_id: 1,
                kind: EventKind::FillRect {
                    x: 0,
                    y: 0,
                    w: 10,
                    h: 10,
                },
            },
            Event {
                canvas_id: 1,
                kind: EventKind::Commit,
            },
        ];
        assert_eq!(roundtrip(&events), events);
    }

    #[test]
    fn gradient_paint_roundtrips() {
        let gradient = Gradient {
            kind: GradientKind::Linear,
            args: vec![0.0, 0.0, 10.0, 10.0],
            stops: vec![
                GradientStop {
                    offset: 0.0,
                    color: "red".into(),
                },
                GradientStop {
                    offset: 1.0,
                    color: "blue".into(),
                },
            ],
        };
        let events = vec![Event {
            canvas_id: 2,
            kind: EventKind::StrokeStyle(Paint::Gradient(gradient)),
        }];
        assert_eq!(roundtrip(&events), events);
    }

    #[test]
    fn round_rect_and_dash_array_roundtrip() {
        let events = vec![
            Event {
                canvas_id: 3,
                kind: EventKind::RoundRect {
                    x: 0,
                    y: 0,
                    w: 20,
                    h: 20,
                    radii: vec![2, 4, 6, 8],
                },
            },
            Event {
                canvas_id: 3,
                kind: EventKind::SetLineDash(vec![1.0, 2.0, 3.0]),
            },
        ];
        assert_eq!(roundtrip(&events), events);
    }

    #[test]
    fn fill_text_with_and_without_max_width() {
        let events = vec![
            Event {
                canvas_id: 4,
                kind: EventKind::FillText {
                    text: "hi".into(),
                    x: 1,
                    y: 2,
                    max_width: None,
                },
            },
            Event {
                canvas_id: 4,
                kind: EventKind::StrokeText {
                    text: "bye".into(),
                    x: 3,
                    y: 4,
                    max_width: Some(50),
                },
            },
        ];
        assert_eq!(roundtrip(&events), events);
    }

    #[test]
    fn draw_image_variants_roundtrip() {
        let events = vec![
            Event {
                canvas_id: 5,
                kind: EventKind::DrawImage {
                    variant: DrawImageVariant::Simple,
                    id: 1,
                    params: vec![1, 2],
                },
            },
            Event {
                canvas_id: 5,
                kind: EventKind::DrawImage {
                    variant: DrawImageVariant::Cropped,
                    id: 1,
                    params: vec![1, 2, 3, 4, 5, 6, 7, 8],
                },
            },
        ];
        assert_eq!(roundtrip(&events), events);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let stream = BipStream::create(64).unwrap();
        let (producer, consumer) = stream.split();
        let mut writer = Writer::new(producer, Busy);
        let mut reader = Reader::new(consumer, Busy);
        writer.write_u8(255).unwrap();
        writer.write_u16(0).unwrap();
        assert!(matches!(
            Event::unpack(&mut reader),
            Err(BridgeError::BadEvent { .. })
        ));
    }

    #[test]
    fn drawimage_param_count_mismatch_is_rejected() {
        let stream = BipStream::create(64).unwrap();
        let (producer, _consumer) = stream.split();
        let mut writer = Writer::new(producer, Busy);
        let bad = Event {
            canvas_id: 1,
            kind: EventKind::DrawImage {
                variant: DrawImageVariant::Simple,
                id: 1,
                params: vec![1, 2, 3],
            },
        };
        assert!(matches!(bad.pack(&mut writer), Err(BridgeError::BadEvent { .. })));
    }
}
