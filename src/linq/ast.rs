//! The aggregation pipeline as a tree of stages, filters and expressions. Every node renders to
//! the BSON the server expects.

#![allow(missing_docs)]

use crate::bson::{doc, Bson, Document};

/// An aggregation expression operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AstOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    Not,
    In,
    Size,
    Sum,
    Min,
    Max,
    Avg,
    First,
    Last,
}

impl AstOperator {
    fn name(self) -> &'static str {
        match self {
            Self::Add => "$add",
            Self::Subtract => "$subtract",
            Self::Multiply => "$multiply",
            Self::Divide => "$divide",
            Self::Mod => "$mod",
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::And => "$and",
            Self::Or => "$or",
            Self::Not => "$not",
            Self::In => "$in",
            Self::Size => "$size",
            Self::Sum => "$sum",
            Self::Min => "$min",
            Self::Max => "$max",
            Self::Avg => "$avg",
            Self::First => "$first",
            Self::Last => "$last",
        }
    }
}

/// An aggregation expression.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum AstExpression {
    Constant(Bson),
    /// A field of the current document, by dotted path.
    Field(String),
    /// A variable such as `ROOT` or one bound by `$map`, possibly followed by a dotted path.
    Variable(String),
    Operator {
        operator: AstOperator,
        args: Vec<AstExpression>,
    },
    ComputedDocument(Vec<(String, AstExpression)>),
    Map {
        input: Box<AstExpression>,
        variable: String,
        body: Box<AstExpression>,
    },
}

impl AstExpression {
    pub(crate) const ROOT: &'static str = "ROOT";

    pub(crate) fn root() -> Self {
        Self::Variable(Self::ROOT.to_string())
    }

    pub(crate) fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    pub(crate) fn operator(operator: AstOperator, args: Vec<AstExpression>) -> Self {
        Self::Operator { operator, args }
    }

    /// The expression for `name` inside the value of this one, when that can be written as a
    /// path.
    pub(crate) fn sub_field(&self, name: &str) -> Option<Self> {
        match self {
            Self::Variable(variable) if variable == Self::ROOT => Some(Self::Field(name.into())),
            Self::Field(path) => Some(Self::Field(format!("{path}.{name}"))),
            Self::Variable(variable) => Some(Self::Variable(format!("{variable}.{name}"))),
            _ => None,
        }
    }

    /// The dotted path of a plain field reference.
    pub(crate) fn field_path(&self) -> Option<&str> {
        match self {
            Self::Field(path) => Some(path),
            _ => None,
        }
    }

    pub fn render(&self) -> Bson {
        match self {
            Self::Constant(Bson::String(s)) if s.starts_with('$') => {
                Bson::Document(doc! { "$literal": s.as_str() })
            }
            Self::Constant(value) => value.clone(),
            Self::Field(path) => Bson::String(format!("${path}")),
            Self::Variable(name) => Bson::String(format!("$${name}")),
            Self::Operator { operator, args } => {
                let args = match args.as_slice() {
                    [arg] => arg.render(),
                    args => Bson::Array(args.iter().map(Self::render).collect()),
                };
                Bson::Document(doc! { operator.name(): args })
            }
            Self::ComputedDocument(fields) => Bson::Document(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.render()))
                    .collect(),
            ),
            Self::Map {
                input,
                variable,
                body,
            } => Bson::Document(doc! {
                "$map": {
                    "input": input.render(),
                    "as": variable.as_str(),
                    "in": body.render(),
                }
            }),
        }
    }
}

/// A comparison of a field against a value, in query language form.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum AstComparison {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
}

impl AstComparison {
    fn render(&self) -> Bson {
        let (name, value) = match self {
            // A document would read as a query on its own fields.
            Self::Eq(value) if !matches!(value, Bson::Document(_)) => return value.clone(),
            Self::Eq(value) => ("$eq", value.clone()),
            Self::Ne(value) => ("$ne", value.clone()),
            Self::Gt(value) => ("$gt", value.clone()),
            Self::Gte(value) => ("$gte", value.clone()),
            Self::Lt(value) => ("$lt", value.clone()),
            Self::Lte(value) => ("$lte", value.clone()),
            Self::In(values) => ("$in", Bson::Array(values.clone())),
        };
        Bson::Document(doc! { name: value })
    }
}

/// A query filter, as used by `$match`.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum AstFilter {
    Field {
        path: String,
        comparison: AstComparison,
    },
    And(Vec<AstFilter>),
    Or(Vec<AstFilter>),
    Nor(Vec<AstFilter>),
    /// An aggregation expression evaluated against each document.
    Expr(AstExpression),
}

impl AstFilter {
    pub fn render(&self) -> Document {
        let list = |filters: &[AstFilter]| {
            Bson::Array(
                filters
                    .iter()
                    .map(|filter| Bson::Document(filter.render()))
                    .collect(),
            )
        };
        match self {
            Self::Field { path, comparison } => doc! { path.as_str(): comparison.render() },
            Self::And(filters) => doc! { "$and": list(filters.as_slice()) },
            Self::Or(filters) => doc! { "$or": list(filters.as_slice()) },
            Self::Nor(filters) => doc! { "$nor": list(filters.as_slice()) },
            Self::Expr(expression) => doc! { "$expr": expression.render() },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AstAccumulatorOperator {
    Sum,
    Min,
    Max,
    Avg,
    First,
    Last,
    Push,
}

/// A `$group` accumulator.
#[derive(Clone, Debug, PartialEq)]
pub struct AstAccumulator {
    pub operator: AstAccumulatorOperator,
    pub arg: AstExpression,
}

impl AstAccumulator {
    pub(crate) fn new(operator: AstAccumulatorOperator, arg: AstExpression) -> Self {
        Self { operator, arg }
    }

    pub fn render(&self) -> Document {
        let name = match self.operator {
            AstAccumulatorOperator::Sum => "$sum",
            AstAccumulatorOperator::Min => "$min",
            AstAccumulatorOperator::Max => "$max",
            AstAccumulatorOperator::Avg => "$avg",
            AstAccumulatorOperator::First => "$first",
            AstAccumulatorOperator::Last => "$last",
            AstAccumulatorOperator::Push => "$push",
        };
        doc! { name: self.arg.render() }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum AstProjection {
    Include,
    Exclude,
    Set(AstExpression),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AstSortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AstSortField {
    pub path: String,
    pub direction: AstSortDirection,
}

/// A pipeline stage.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum AstStage {
    Match(AstFilter),
    Project(Vec<(String, AstProjection)>),
    Group {
        id: AstExpression,
        fields: Vec<(String, AstAccumulator)>,
    },
    Sort(Vec<AstSortField>),
    /// Unwinds the array at a field path.
    Unwind(String),
    ReplaceRoot(AstExpression),
    Skip(i64),
    Limit(i64),
}

impl AstStage {
    pub fn render(&self) -> Document {
        match self {
            Self::Match(filter) => doc! { "$match": filter.render() },
            Self::Project(fields) => {
                let body: Document = fields
                    .iter()
                    .map(|(path, projection)| {
                        let value = match projection {
                            AstProjection::Include => Bson::Int32(1),
                            AstProjection::Exclude => Bson::Int32(0),
                            // A bare number or boolean would read as an inclusion.
                            AstProjection::Set(AstExpression::Constant(value)) => {
                                Bson::Document(doc! { "$literal": value.clone() })
                            }
                            AstProjection::Set(expression) => expression.render(),
                        };
                        (path.clone(), value)
                    })
                    .collect();
                doc! { "$project": body }
            }
            Self::Group { id, fields } => {
                let mut body = doc! { "_id": id.render() };
                for (name, accumulator) in fields {
                    body.insert(name.as_str(), accumulator.render());
                }
                doc! { "$group": body }
            }
            Self::Sort(fields) => {
                let body: Document = fields
                    .iter()
                    .map(|field| {
                        let direction = match field.direction {
                            AstSortDirection::Ascending => 1,
                            AstSortDirection::Descending => -1,
                        };
                        (field.path.clone(), Bson::Int32(direction))
                    })
                    .collect();
                doc! { "$sort": body }
            }
            Self::Unwind(path) => doc! { "$unwind": format!("${path}") },
            Self::ReplaceRoot(new_root) => doc! { "$replaceRoot": { "newRoot": new_root.render() } },
            Self::Skip(count) => doc! { "$skip": *count },
            Self::Limit(count) => doc! { "$limit": *count },
        }
    }
}
