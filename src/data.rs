//! Values passed between commands: arguments inside a bundle and command results.

use crate::error::ShellError;
use std::fmt;
use std::sync::Arc;

/// Display color attached to text values.
///
/// The renderer decides how to show it; the terminal renderer maps it to ANSI colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// The renderer's default foreground.
    Plain,
    Yellow,
    Aqua,
    Gold,
    Green,
    Red,
    Magenta,
    Cyan,
    Gray,
    /// Arbitrary 24-bit color.
    Rgb(u8, u8, u8),
}

impl Color {
    /// Color of text values built without an explicit color.
    pub const TEXT: Color = Color::Yellow;
    /// Color used to render integers.
    pub const INTEGER: Color = Color::Rgb(255, 69, 0);
    /// Color used to render image descriptions.
    pub const IMAGE: Color = Color::Rgb(127, 255, 212);
}

/// Opaque, cheaply clonable image handle.
///
/// Pixels are stored as RGBA rows. Decoding files and showing images on screen is
/// left to the embedding application.
#[derive(Clone)]
pub struct Image(Arc<ImageBuffer>);

struct ImageBuffer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Image {
    /// Largest number of pixels a single image may hold.
    pub const MAX_PIXELS: u64 = 1 << 24;

    /// A fully transparent image of the given size.
    ///
    /// Fails with [`ShellError::BadUsage`] above [`Image::MAX_PIXELS`].
    pub fn blank(width: u32, height: u32) -> Result<Self, ShellError> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels > Self::MAX_PIXELS {
            return Err(ShellError::BadUsage(format!(
                "image {}x{} exceeds {} pixels",
                width,
                height,
                Self::MAX_PIXELS
            )));
        }
        Ok(Self(Arc::new(ImageBuffer {
            width,
            height,
            rgba: vec![0; pixels as usize * 4],
        })))
    }

    pub fn width(&self) -> u32 {
        self.0.width
    }

    pub fn height(&self) -> u32 {
        self.0.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.0.rgba
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image({}x{})", self.width(), self.height())
    }
}

impl PartialEq for Image {
    /// Two handles are equal when they point at the same buffer.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Tag of a [`Value`], used by rules and typed accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    None,
    Text,
    Integer,
    Image,
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::None => "none",
            ValueKind::Text => "text",
            ValueKind::Integer => "integer",
            ValueKind::Image => "image",
            ValueKind::List => "list",
        };
        f.write_str(name)
    }
}

/// A typed piece of data.
///
/// Values are never coerced implicitly: every typed accessor checks the tag and fails
/// with [`ShellError::WrongType`] on mismatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Text(String, Color),
    Integer(i64),
    Image(Image),
    List(Vec<Value>),
}

impl Value {
    /// Text in the default text color.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into(), Color::TEXT)
    }

    /// Text in the given color.
    pub fn colored(s: impl Into<String>, color: Color) -> Self {
        Value::Text(s.into(), color)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::None => ValueKind::None,
            Value::Text(..) => ValueKind::Text,
            Value::Integer(_) => ValueKind::Integer,
            Value::Image(_) => ValueKind::Image,
            Value::List(_) => ValueKind::List,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_text(&self) -> Result<&str, ShellError> {
        match self {
            Value::Text(s, _) => Ok(s),
            other => Err(other.wrong_type(ValueKind::Text)),
        }
    }

    pub fn as_integer(&self) -> Result<i64, ShellError> {
        match self {
            Value::Integer(i) => Ok(*i),
            other => Err(other.wrong_type(ValueKind::Integer)),
        }
    }

    pub fn as_image(&self) -> Result<&Image, ShellError> {
        match self {
            Value::Image(img) => Ok(img),
            other => Err(other.wrong_type(ValueKind::Image)),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], ShellError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(other.wrong_type(ValueKind::List)),
        }
    }

    /// The elements of a list whose elements all carry the tag `kind`.
    pub fn list_of(&self, kind: ValueKind) -> Result<&[Value], ShellError> {
        let items = self.as_list()?;
        match items.iter().find(|v| v.kind() != kind) {
            Some(bad) => Err(ShellError::ListType {
                expected: kind,
                found: bad.kind(),
            }),
            None => Ok(items),
        }
    }

    /// Fails with [`ShellError::WrongType`] unless this value carries the tag `kind`.
    pub fn expect_kind(self, kind: ValueKind) -> Result<Value, ShellError> {
        if self.kind() == kind {
            Ok(self)
        } else {
            Err(self.wrong_type(kind))
        }
    }

    fn wrong_type(&self, expected: ValueKind) -> ShellError {
        ShellError::WrongType {
            expected,
            found: self.kind(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("NONE"),
            Value::Text(s, _) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Image(img) => write!(f, "Image@{}x{}", img.width(), img.height()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::text(s)
    }
}

impl From<Image> for Value {
    fn from(img: Image) -> Self {
        Value::Image(img)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
