use crate::bson::Bson;

/// The BSON type a scalar serializer reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum ValueKind {
    /// Any BSON value, when nothing more is known.
    Any,
    Boolean,
    Int32,
    Int64,
    Double,
    Decimal128,
    String,
    DateTime,
    ObjectId,
}

impl ValueKind {
    fn of(value: &Bson) -> Self {
        match value {
            Bson::Boolean(_) => Self::Boolean,
            Bson::Int32(_) => Self::Int32,
            Bson::Int64(_) => Self::Int64,
            Bson::Double(_) => Self::Double,
            Bson::Decimal128(_) => Self::Decimal128,
            Bson::String(_) => Self::String,
            Bson::DateTime(_) => Self::DateTime,
            Bson::ObjectId(_) => Self::ObjectId,
            _ => Self::Any,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Int32 | Self::Int64 | Self::Double | Self::Decimal128
        )
    }
}

/// Describes how the values flowing through a pipeline are stored, so that member accesses can be
/// turned into field paths and results can be read back.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Serializer {
    Value(ValueKind),
    Document(DocumentSerializer),
    Array(Box<Serializer>),
    /// A value that is not a document, stored in the `_v` field of a wrapper document.
    Wrapped(Box<Serializer>),
    /// The output of a group stage: the key in `_id` and the grouped documents in `_elements`.
    Grouping {
        key: Box<Serializer>,
        element: Box<Serializer>,
    },
}

impl Serializer {
    /// A document type whose members are stored under their own names and may hold any value.
    pub fn document<S: Into<String>>(
        type_name: impl Into<String>,
        members: impl IntoIterator<Item = S>,
    ) -> Self {
        let document = members
            .into_iter()
            .fold(DocumentSerializer::new(type_name), |document, name| {
                document.member(name, Self::any())
            });
        Self::Document(document)
    }

    pub fn any() -> Self {
        Self::Value(ValueKind::Any)
    }

    pub fn value(kind: ValueKind) -> Self {
        Self::Value(kind)
    }

    pub fn array(item: impl Into<Serializer>) -> Self {
        Self::Array(Box::new(item.into()))
    }

    pub(crate) fn wrapped(inner: Serializer) -> Self {
        match inner {
            Self::Wrapped(_) => inner,
            inner => Self::Wrapped(Box::new(inner)),
        }
    }

    pub(crate) fn grouping(key: Serializer, element: Serializer) -> Self {
        Self::Grouping {
            key: Box::new(key),
            element: Box::new(element),
        }
    }

    /// The serializer of a constant.
    pub(crate) fn for_value(value: &Bson) -> Self {
        Self::Value(ValueKind::of(value))
    }

    /// The serializer of the result of arithmetic on values of the two serializers.
    pub(crate) fn numeric_result(left: &Serializer, right: &Serializer) -> Self {
        let kind = match (left, right) {
            (Self::Value(l), Self::Value(r)) if l.is_numeric() && r.is_numeric() => {
                [ValueKind::Decimal128, ValueKind::Double, ValueKind::Int64]
                    .into_iter()
                    .find(|kind| l == kind || r == kind)
                    .unwrap_or(ValueKind::Int32)
            }
            _ => ValueKind::Any,
        };
        Self::Value(kind)
    }

    /// A name for diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Self::Value(kind) => kind.to_string(),
            Self::Document(document) => document.type_name.clone(),
            Self::Array(item) => format!("{}[]", item.type_name()),
            Self::Wrapped(inner) => inner.type_name(),
            Self::Grouping { key, element } => {
                format!("Grouping<{}, {}>", key.type_name(), element.type_name())
            }
        }
    }
}

impl From<DocumentSerializer> for Serializer {
    fn from(document: DocumentSerializer) -> Self {
        Self::Document(document)
    }
}

impl From<ValueKind> for Serializer {
    fn from(kind: ValueKind) -> Self {
        Self::Value(kind)
    }
}

/// A member of a document type and the element it is stored in.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberSerializer {
    pub name: String,
    pub element_name: String,
    pub serializer: Serializer,
}

/// The serializer of a document type.
///
/// A type that is part of a hierarchy stores a discriminator value in the `_t` field, which is
/// what `OfType` filters on. Derived types are registered on their base type with
/// [`DocumentSerializer::derived`].
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSerializer {
    type_name: String,
    members: Vec<MemberSerializer>,
    discriminator: Option<String>,
    derived: Vec<DocumentSerializer>,
}

impl DocumentSerializer {
    pub const DISCRIMINATOR_ELEMENT: &'static str = "_t";

    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            members: Vec::new(),
            discriminator: None,
            derived: Vec::new(),
        }
    }

    /// Adds a member stored under its own name.
    pub fn member(self, name: impl Into<String>, serializer: impl Into<Serializer>) -> Self {
        let name = name.into();
        self.element(name.clone(), name, serializer)
    }

    /// Adds a member stored under a different element name.
    pub fn element(
        mut self,
        name: impl Into<String>,
        element_name: impl Into<String>,
        serializer: impl Into<Serializer>,
    ) -> Self {
        self.members.push(MemberSerializer {
            name: name.into(),
            element_name: element_name.into(),
            serializer: serializer.into(),
        });
        self
    }

    /// Sets the value stored in `_t`. Defaults to the type name.
    pub fn discriminator(mut self, value: impl Into<String>) -> Self {
        self.discriminator = Some(value.into());
        self
    }

    /// Registers a type derived from this one.
    pub fn derived(mut self, derived: DocumentSerializer) -> Self {
        self.derived.push(derived);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn members(&self) -> &[MemberSerializer] {
        &self.members
    }

    pub(crate) fn lookup_member(&self, name: &str) -> Option<&MemberSerializer> {
        self.members.iter().find(|member| member.name == name)
    }

    pub(crate) fn discriminator_value(&self) -> &str {
        self.discriminator.as_deref().unwrap_or(&self.type_name)
    }

    /// Finds `type_name` among the types derived from this one, at any depth.
    pub(crate) fn find_derived(&self, type_name: &str) -> Option<&DocumentSerializer> {
        self.derived.iter().find_map(|derived| {
            if derived.type_name == type_name {
                Some(derived)
            } else {
                derived.find_derived(type_name)
            }
        })
    }
}
