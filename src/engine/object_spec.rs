//! Textual object specifications.
//!
//! An object is typed as a single line: a class name followed by
//! space-separated arguments. A handful of leading words do not name a class
//! but select the kind of box instead (messages, comments, atoms and list
//! boxes). Those words are stripped here and turned into a [`TypeSymbol`], so
//! the engine only ever sees the remaining arguments.

use std::fmt;

/// A single token of an object specification.
#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    /// Numeric argument.
    Float(f32),
    /// Any other word.
    Symbol(String),
}

impl Atom {
    /// Parses one whitespace-free token.
    ///
    /// A token made only of digits, `e`, `.`, `-` and `+` is treated as a
    /// number when it actually parses as one. A lone `-` stays a symbol.
    pub fn parse(token: &str) -> Self {
        let numeric = !token.is_empty()
            && token != "-"
            && token.chars().all(|c| "0123456789e.-+".contains(c));

        if numeric {
            if let Ok(value) = token.parse::<f32>() {
                return Atom::Float(value);
            }
        }

        Atom::Symbol(token.to_string())
    }

    /// Returns the numeric value, if this is a float atom.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Atom::Float(value) => Some(*value),
            Atom::Symbol(_) => None,
        }
    }

    /// Returns the word, if this is a symbol atom.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Atom::Float(_) => None,
            Atom::Symbol(word) => Some(word),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Float(value) => write!(f, "{}", value),
            Atom::Symbol(word) => write!(f, "{}", word),
        }
    }
}

/// The kind of box an object specification creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeSymbol {
    /// A regular object box; the first atom names its class.
    Object,
    /// A message box.
    Message,
    /// A free-standing comment.
    Comment,
    /// A numeric atom box.
    FloatAtom,
    /// A symbol atom box.
    SymbolAtom,
    /// A list box.
    ListBox,
}

impl TypeSymbol {
    /// Maps a leading keyword to the box kind it selects.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "msg" | "message" => Some(TypeSymbol::Message),
            "comment" => Some(TypeSymbol::Comment),
            "floatatom" => Some(TypeSymbol::FloatAtom),
            "symbolatom" => Some(TypeSymbol::SymbolAtom),
            "listbox" => Some(TypeSymbol::ListBox),
            _ => None,
        }
    }

    /// The keyword that selects this kind, `None` for plain objects.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            TypeSymbol::Object => None,
            TypeSymbol::Message => Some("msg"),
            TypeSymbol::Comment => Some("comment"),
            TypeSymbol::FloatAtom => Some("floatatom"),
            TypeSymbol::SymbolAtom => Some("symbolatom"),
            TypeSymbol::ListBox => Some("listbox"),
        }
    }

    /// Messages and atoms cannot change their text in place.
    pub fn is_renamable(&self) -> bool {
        matches!(self, TypeSymbol::Object | TypeSymbol::Comment)
    }
}

/// A parsed object specification: box kind plus argument atoms.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSpec {
    pub type_symbol: TypeSymbol,
    pub atoms: Vec<Atom>,
}

impl ObjectSpec {
    /// Parses a full specification line such as `"osc~ 440"` or `"msg bang"`.
    pub fn parse(text: &str) -> Self {
        let mut tokens = text.split_whitespace().peekable();

        let type_symbol = match tokens.peek().and_then(|word| TypeSymbol::from_keyword(word)) {
            Some(type_symbol) => {
                tokens.next();
                type_symbol
            }
            None => TypeSymbol::Object,
        };

        Self {
            type_symbol,
            atoms: tokens.map(Atom::parse).collect(),
        }
    }

    /// Class name of a plain object, e.g. `osc~` for `"osc~ 440"`.
    ///
    /// Other box kinds report their keyword.
    pub fn class_name(&self) -> Option<String> {
        match self.type_symbol.keyword() {
            Some(keyword) => Some(keyword.to_string()),
            None => self.atoms.first().map(|atom| atom.to_string()),
        }
    }

    /// Arguments following the class name (all atoms for non-object kinds).
    pub fn arguments(&self) -> &[Atom] {
        match self.type_symbol {
            TypeSymbol::Object if !self.atoms.is_empty() => &self.atoms[1..],
            _ => &self.atoms,
        }
    }

    /// The atoms joined back into text, without the kind keyword.
    pub fn body(&self) -> String {
        self.atoms
            .iter()
            .map(|atom| atom.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Text that parses back into an equal specification.
    pub fn to_text(&self) -> String {
        match self.type_symbol.keyword() {
            Some(keyword) if self.atoms.is_empty() => keyword.to_string(),
            Some(keyword) => format!("{} {}", keyword, self.body()),
            None => self.body(),
        }
    }

    /// A plain object without any tokens carries no class to instantiate.
    pub fn is_empty(&self) -> bool {
        self.type_symbol == TypeSymbol::Object && self.atoms.is_empty()
    }
}
