//! Symbol table and the hiasm data-type system.
//!
//! One flat table per compilation unit – hiasm has no lexical scoping, so
//! names declared anywhere stay visible for the rest of the program and a
//! second declaration of the same name is rejected before any storage is
//! handed out.

use std::collections::HashMap;
use std::fmt;

/// Declared data types. `Byte` widens to `Int` (and back) silently;
/// `Ptr` never mixes with the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
  Int,
  Byte,
  Ptr,
}

impl DataType {
  /// Map a declared type keyword to its data type.
  pub fn from_keyword(text: &str) -> Option<Self> {
    match text {
      "int" => Some(Self::Int),
      "byte" => Some(Self::Byte),
      "ptr" => Some(Self::Ptr),
      _ => None,
    }
  }

  pub fn is_pointer(self) -> bool {
    matches!(self, Self::Ptr)
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Int => "int",
      Self::Byte => "byte",
      Self::Ptr => "ptr",
    };
    write!(f, "{name}")
  }
}

/// Where a declared name lives. `Pointer` marks frame-resident pointer
/// cells, the only valid targets of the `@name = expr` dereferenced store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
  Register,
  Stack,
  Pointer,
}

/// Concrete address of a data symbol: a slot in the 4-register pool or a
/// byte offset below the frame base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
  Register(usize),
  Frame(i32),
}

#[derive(Debug, Clone)]
pub enum Symbol {
  Function {
    params: Vec<DataType>,
  },
  Data {
    storage: StorageKind,
    ty: DataType,
    location: Location,
  },
}

/// Guarded associative map: insertion rejects duplicates, lookup never
/// removes. Entries live for the whole compilation.
#[derive(Debug, Default)]
pub struct SymbolTable {
  symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert `symbol` under `name`. Returns `false` (and inserts nothing)
  /// when the name is already taken; the caller records the diagnostic.
  pub fn declare(&mut self, name: &str, symbol: Symbol) -> bool {
    if self.symbols.contains_key(name) {
      return false;
    }
    self.symbols.insert(name.to_string(), symbol);
    true
  }

  pub fn lookup(&self, name: &str) -> Option<&Symbol> {
    self.symbols.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.symbols.contains_key(name)
  }
}

/// Assignment/operand compatibility: exact match, except that byte and int
/// widen into each other silently, in either position.
pub fn compatible(expected: DataType, actual: DataType) -> bool {
  expected == actual
    || matches!(
      (expected, actual),
      (DataType::Int, DataType::Byte) | (DataType::Byte, DataType::Int)
    )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn declare_rejects_duplicates_without_replacing() {
    let mut table = SymbolTable::new();
    assert!(table.declare(
      "x",
      Symbol::Data {
        storage: StorageKind::Register,
        ty: DataType::Int,
        location: Location::Register(0),
      }
    ));
    assert!(!table.declare(
      "x",
      Symbol::Data {
        storage: StorageKind::Stack,
        ty: DataType::Byte,
        location: Location::Frame(4),
      }
    ));

    // The original entry survives the rejected redeclaration.
    match table.lookup("x") {
      Some(Symbol::Data { location, .. }) => assert_eq!(*location, Location::Register(0)),
      other => panic!("unexpected symbol: {other:?}"),
    }
  }

  #[test]
  fn lookup_misses_undeclared_names() {
    let table = SymbolTable::new();
    assert!(table.lookup("ghost").is_none());
  }

  #[test]
  fn byte_and_int_are_interchangeable() {
    assert!(compatible(DataType::Int, DataType::Byte));
    assert!(compatible(DataType::Byte, DataType::Int));
    assert!(compatible(DataType::Int, DataType::Int));
    assert!(compatible(DataType::Ptr, DataType::Ptr));
  }

  #[test]
  fn pointers_never_widen() {
    assert!(!compatible(DataType::Ptr, DataType::Int));
    assert!(!compatible(DataType::Int, DataType::Ptr));
    assert!(!compatible(DataType::Ptr, DataType::Byte));
    assert!(!compatible(DataType::Byte, DataType::Ptr));
  }

  #[test]
  fn type_keywords_resolve() {
    assert_eq!(DataType::from_keyword("int"), Some(DataType::Int));
    assert_eq!(DataType::from_keyword("byte"), Some(DataType::Byte));
    assert_eq!(DataType::from_keyword("ptr"), Some(DataType::Ptr));
    assert_eq!(DataType::from_keyword("float"), None);
  }
}
