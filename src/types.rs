use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Void,
    Int,
    Char,
    IntArray,
    CharArray,
}

impl Type {
    pub fn as_str(&self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::Int => "int",
            Type::Char => "char",
            Type::IntArray => "array(int)",
            Type::CharArray => "array(char)",
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::IntArray | Type::CharArray)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Int | Type::Char)
    }

    /// Element type of an array, `Void` for anything else.
    pub fn inner_type(&self) -> Type {
        match self {
            Type::IntArray => Type::Int,
            Type::CharArray => Type::Char,
            _ => Type::Void,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
