//! Normalized SQL type descriptions.
//!
//! Engine adapters translate their native column types into a
//! [`TypeDescriptor`]: an engine-independent [`NormalizedType`] plus the two
//! standardized SQL spellings (SQL:1999 and SQL:2008) used by the archive
//! format. Spellings that an adapter never filled in are resolved lazily by
//! [`TypeDescriptor::sql99`]/[`TypeDescriptor::sql2008`] with a deterministic
//! fallback chain.

use std::cell::RefCell;

/// Fallback spelling used when neither normalized spelling was set.
pub const FALLBACK_SPELLING: &str = "VARCHAR(2147483647)";

/// Engine-independent description of a column type.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedType {
    /// Character data, fixed or variable length.
    String {
        /// Maximum length in characters.
        length: u64,
        /// Variable-length (VARCHAR-like) vs fixed-length (CHAR-like).
        variable: bool,
        /// Character set name, if the source engine reported one.
        charset: Option<String>,
    },

    /// Exact numeric with precision and scale.
    NumericExact { precision: u32, scale: u32 },

    /// Approximate numeric (binary floating point) with precision in bits.
    NumericApproximate { precision: u32 },

    /// Boolean.
    Boolean,

    /// Date and/or time.
    DateTime {
        /// Whether a time-of-day component is present.
        time_defined: bool,
        /// Whether a timezone offset is present.
        timezone_defined: bool,
    },

    /// Binary data. `length` is the declared maximum, if bounded.
    Binary {
        length: Option<u64>,
        /// Format-registry key (e.g. a PRONOM identifier), if the source
        /// engine or an earlier archive recorded one.
        format_registry: Option<String>,
    },

    /// Struct-like type with named children. Must not be self-referential.
    Composed(ComposedType),

    /// Array of a single element type.
    Array(Box<TypeDescriptor>),

    /// A type the adapter could not map. Always encoded as a string.
    Unsupported {
        /// The original descriptor, kept for reporting.
        original: String,
    },
}

impl NormalizedType {
    /// Whether this is a composed (struct-like) type.
    pub fn is_composed(&self) -> bool {
        matches!(self, NormalizedType::Composed(_))
    }
}

/// A normalized type together with its source spelling, standardized
/// spellings and optional description.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// The normalized shape of the type.
    pub kind: NormalizedType,

    /// Source-engine spelling (e.g. "nvarchar(80)"), if known.
    pub original_type_name: Option<String>,

    /// Normalized SQL:1999 spelling, if set by the adapter.
    sql99_name: Option<String>,

    /// Normalized SQL:2008 spelling, if set by the adapter.
    sql2008_name: Option<String>,

    /// Free-text description, if any.
    pub description: Option<String>,
}

impl TypeDescriptor {
    /// Create a descriptor with no spellings set; they will be derived on
    /// demand from the normalized kind.
    pub fn new(kind: NormalizedType) -> Self {
        Self {
            kind,
            original_type_name: None,
            sql99_name: None,
            sql2008_name: None,
            description: None,
        }
    }

    /// Builder-style setter for the original type name.
    pub fn with_original(mut self, name: impl Into<String>) -> Self {
        self.original_type_name = Some(name.into());
        self
    }

    /// Builder-style setter for the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the SQL:1999 spelling explicitly.
    pub fn set_sql99(&mut self, spelling: impl Into<String>) {
        self.sql99_name = Some(spelling.into());
    }

    /// Set the SQL:2008 spelling explicitly.
    pub fn set_sql2008(&mut self, spelling: impl Into<String>) {
        self.sql2008_name = Some(spelling.into());
    }

    /// The SQL:1999 spelling.
    ///
    /// Resolution order: the explicitly set SQL:1999 spelling, then the
    /// SQL:2008 spelling, then a spelling generated from the normalized
    /// kind in the SQL:1999 dialect, then [`FALLBACK_SPELLING`]. Resolution
    /// never overwrites a spelling that is already set, so calling it
    /// repeatedly is idempotent.
    pub fn sql99(&self) -> String {
        self.resolve(
            &self.sql99_name,
            &self.sql2008_name,
            crate::typemap::sql99_spelling,
        )
    }

    /// The SQL:2008 spelling. Same resolution rules as [`Self::sql99`],
    /// with the generated spelling in the SQL:2008 dialect.
    pub fn sql2008(&self) -> String {
        self.resolve(
            &self.sql2008_name,
            &self.sql99_name,
            crate::typemap::sql2008_spelling,
        )
    }

    fn resolve(
        &self,
        own: &Option<String>,
        sibling: &Option<String>,
        generate: fn(&NormalizedType) -> Option<String>,
    ) -> String {
        if let Some(s) = non_blank(own) {
            return s.to_string();
        }
        if let Some(s) = non_blank(sibling) {
            return s.to_string();
        }
        generate(&self.kind).unwrap_or_else(|| FALLBACK_SPELLING.to_string())
    }
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.trim().is_empty())
}

/// One leaf of a flattened composed type.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafField {
    /// Name of the leaf child itself.
    pub name: String,
    /// Dotted path from the composed root to the leaf, e.g. "a.b.c".
    pub path: String,
    /// The leaf's type.
    pub descriptor: TypeDescriptor,
}

/// A type composed by structuring other types.
///
/// Children are kept in insertion order so that the flattened leaf list has
/// a stable order across the schema generator and the row encoder. The
/// flattening is memoized and invalidated on every [`ComposedType::add_child`].
#[derive(Debug, Clone, Default)]
pub struct ComposedType {
    children: Vec<(String, TypeDescriptor)>,
    /// Memoized pre-order flattening to non-composed leaves.
    /// Single-threaded use only, like the rest of the codec.
    leaf_cache: RefCell<Option<Vec<LeafField>>>,
}

impl PartialEq for ComposedType {
    fn eq(&self, other: &Self) -> bool {
        self.children == other.children
    }
}

impl ComposedType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named child, invalidating the memoized flattening.
    pub fn add_child(&mut self, name: impl Into<String>, descriptor: TypeDescriptor) {
        self.children.push((name.into(), descriptor));
        *self.leaf_cache.borrow_mut() = None;
    }

    /// Direct children only, in insertion order.
    pub fn direct_children(&self) -> &[(String, TypeDescriptor)] {
        &self.children
    }

    /// Whether any direct child is itself composed.
    pub fn is_hierarchical(&self) -> bool {
        self.children
            .iter()
            .any(|(_, d)| d.kind.is_composed())
    }

    /// Whether any child, at any depth, is a binary type.
    pub fn contains_lobs(&self) -> bool {
        self.children.iter().any(|(_, d)| match &d.kind {
            NormalizedType::Binary { .. } => true,
            NormalizedType::Composed(c) => c.contains_lobs(),
            _ => false,
        })
    }

    /// Detect whether this composed type contains itself, directly or
    /// through nested composed children.
    ///
    /// Nested children are owned clones, so identity is established by the
    /// original type name; unnamed composed types cannot alias each other
    /// and are walked structurally with a depth guard.
    pub fn is_recursive(&self, own_name: Option<&str>) -> bool {
        self.is_recursive_inner(own_name, 0)
    }

    fn is_recursive_inner(&self, root_name: Option<&str>, depth: usize) -> bool {
        // A composed tree deeper than this is, in practice, a cycle: real
        // UDT hierarchies in relational engines are shallow.
        const MAX_DEPTH: usize = 64;
        if depth > MAX_DEPTH {
            return true;
        }
        for (_, child) in &self.children {
            if let NormalizedType::Composed(inner) = &child.kind {
                if let (Some(root), Some(name)) = (root_name, child.original_type_name.as_deref())
                {
                    if root.eq_ignore_ascii_case(name) {
                        return true;
                    }
                }
                if inner.is_recursive_inner(root_name, depth + 1) {
                    return true;
                }
            }
        }
        false
    }

    /// Pre-order flattening to non-composed leaves with dotted paths.
    ///
    /// Fails if the type is self-referential; recursion detection is
    /// mandatory before flattening. The result is memoized.
    pub fn flatten(&self, own_name: Option<&str>) -> crate::error::Result<Vec<LeafField>> {
        if self.is_recursive(own_name) {
            return Err(crate::error::ArchiveError::TypeMapping(format!(
                "composed type {} is self-referential and cannot be flattened",
                own_name.unwrap_or("<anonymous>")
            )));
        }
        if let Some(cached) = self.leaf_cache.borrow().as_ref() {
            return Ok(cached.clone());
        }
        let mut leaves = Vec::new();
        self.collect_leaves(&mut String::new(), &mut leaves);
        *self.leaf_cache.borrow_mut() = Some(leaves.clone());
        Ok(leaves)
    }

    fn collect_leaves(&self, prefix: &mut String, out: &mut Vec<LeafField>) {
        for (name, child) in &self.children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            match &child.kind {
                NormalizedType::Composed(inner) => {
                    let mut sub_prefix = path;
                    inner.collect_leaves(&mut sub_prefix, out);
                }
                _ => out.push(LeafField {
                    name: name.clone(),
                    path,
                    descriptor: child.clone(),
                }),
            }
        }
    }
}
