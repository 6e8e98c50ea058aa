use crate::types::{Point, Value};

/// Radius used for elements without a tabulated van der Waals radius.
pub const DEFAULT_VDW_RADIUS: Value = 2.0;

/// Chemical element of an atom, as far as the size themes care.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Element {
    H,
    C,
    N,
    O,
    P,
    S,
    #[default]
    Unknown,
}

impl Element {
    /// Parses an element symbol, ignoring case and surrounding whitespace.
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol.trim().to_ascii_uppercase().as_str() {
            "H" | "D" => Self::H,
            "C" => Self::C,
            "N" => Self::N,
            "O" => Self::O,
            "P" => Self::P,
            "S" => Self::S,
            _ => Self::Unknown,
        }
    }

    /// Van der Waals radius in Ångström.
    pub fn vdw_radius(self) -> Value {
        match self {
            Self::H => 1.1,
            Self::C => 1.7,
            Self::N => 1.55,
            Self::O => 1.52,
            Self::P => 1.8,
            Self::S => 1.8,
            Self::Unknown => DEFAULT_VDW_RADIUS,
        }
    }
}

/// A point atom of a structure unit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Atom {
    pub position: Point,
    pub element: Element,
}

impl Atom {
    pub fn new(position: Point, element: Element) -> Self {
        Self { position, element }
    }
}

/// Per-atom radius contribution, before the probe radius is added.
pub trait SizeLookup {
    fn size(&self, atom: &Atom) -> Value;
}

impl<F> SizeLookup for F
where
    F: Fn(&Atom) -> Value,
{
    fn size(&self, atom: &Atom) -> Value {
        self(atom)
    }
}

/// Built-in size themes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SizeTheme {
    /// Every atom gets the same size.
    Uniform(Value),
    /// Van der Waals radius of the element, multiplied by `scale`.
    Physical { scale: Value },
}

impl Default for SizeTheme {
    fn default() -> Self {
        Self::Physical { scale: 1.0 }
    }
}

impl SizeLookup for SizeTheme {
    fn size(&self, atom: &Atom) -> Value {
        match *self {
            Self::Uniform(value) => value,
            Self::Physical { scale } => atom.element.vdw_radius() * scale,
        }
    }
}
