//! The dereference engine.
//!
//! Walks a pointer tree against machine state, producing concrete regions
//! in declaration order. Resolution is recursive with a depth guard; names
//! become visible left to right, so a later sibling can use an earlier
//! sibling's region but never the reverse.
//!
//! Self-reference is allowed in either direction within one region: a
//! `length` may read `$this.offset` and vice versa. Each field carries a
//! resolving marker while its expression evaluates; re-entering a field
//! that is still resolving is a circular reference and fails naming the
//! exact path (`$this.offset`), never by guessing from recursion depth.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::{
    cursor::{Cursor, CursorRegion, Regions},
    data::Data,
    error::PointerError,
    expression::{keccak256_concat, Expression, RegionProperty},
    machine::MachineState,
    pointer::{Location, Pointer, Region, Template},
    read::read_region,
};

/// Nesting bound for the recursive resolver. Pointer trees are shallow in
/// practice; this guards against adversarial metadata, not real programs.
const MAX_POINTER_DEPTH: usize = 128;

#[derive(Debug, Clone, Default)]
pub struct DereferenceOptions {
    pub templates: IndexMap<String, Template>,
}

/// Bind a pointer to its templates. Resolution happens lazily, per
/// [`Cursor::view`] call.
pub fn dereference(pointer: &Pointer, options: DereferenceOptions) -> Cursor {
    Cursor::new(pointer.clone(), options.templates)
}

pub(crate) fn resolve<S: MachineState>(
    pointer: &Pointer,
    templates: &IndexMap<String, Template>,
    state: &S,
) -> Result<Regions, PointerError> {
    let mut resolver = Resolver {
        state,
        templates,
        regions: Vec::new(),
        named: FxHashMap::default(),
        variables: Vec::new(),
        current: None,
        depth: 0,
    };
    resolver.resolve_pointer(pointer)?;
    Ok(Regions::new(resolver.regions))
}

/// One field of the region currently being resolved.
#[derive(Debug, Clone)]
enum Field {
    Absent,
    Todo(Expression),
    Resolving,
    Done(Data),
}

impl Field {
    fn new(expr: &Option<Expression>) -> Self {
        match expr {
            Some(expr) => Self::Todo(expr.clone()),
            None => Self::Absent,
        }
    }

    fn into_data(self) -> Option<Data> {
        match self {
            Self::Done(data) => Some(data),
            Self::Absent => None,
            // Every field is forced before the region is finished.
            Self::Todo(_) | Self::Resolving => unreachable!("unforced region field"),
        }
    }
}

#[derive(Debug)]
struct PendingRegion {
    name: Option<String>,
    location: Location,
    slot: Field,
    offset: Field,
    length: Field,
}

impl PendingRegion {
    fn new(region: &Region) -> Self {
        Self {
            name: region.name.clone(),
            location: region.location,
            slot: Field::new(&region.slot),
            offset: Field::new(&region.offset),
            length: Field::new(&region.length),
        }
    }

    fn field_mut(&mut self, property: RegionProperty) -> &mut Field {
        match property {
            RegionProperty::Slot => &mut self.slot,
            RegionProperty::Offset => &mut self.offset,
            RegionProperty::Length => &mut self.length,
        }
    }

    fn finish(self) -> CursorRegion {
        CursorRegion {
            name: self.name,
            location: self.location,
            slot: self.slot.into_data(),
            offset: self.offset.into_data(),
            length: self.length.into_data(),
        }
    }
}

struct Resolver<'a, S: MachineState> {
    state: &'a S,
    templates: &'a IndexMap<String, Template>,
    regions: Vec<CursorRegion>,
    /// Name -> index of the most recently resolved region with that name.
    named: FxHashMap<String, usize>,
    /// Scoped variable bindings; later entries shadow earlier ones.
    variables: Vec<(String, Data)>,
    /// The region whose fields are being evaluated, for `$this`.
    current: Option<PendingRegion>,
    depth: usize,
}

impl<S: MachineState> Resolver<'_, S> {
    fn resolve_pointer(&mut self, pointer: &Pointer) -> Result<(), PointerError> {
        if self.depth >= MAX_POINTER_DEPTH {
            return Err(PointerError::TooDeep);
        }
        self.depth += 1;
        let result = self.resolve_pointer_inner(pointer);
        self.depth -= 1;
        result
    }

    fn resolve_pointer_inner(&mut self, pointer: &Pointer) -> Result<(), PointerError> {
        match pointer {
            Pointer::Region(region) => self.resolve_region(region),

            Pointer::Group(members) => {
                // Each member's names become visible to the members after it.
                for member in members {
                    self.resolve_pointer(member)?;
                }
                Ok(())
            }

            Pointer::List { count, each, is } => {
                let count = self
                    .evaluate(count)?
                    .as_u64()
                    .ok_or_else(|| PointerError::ValueOutOfRange(count.to_string()))?;
                for index in 0..count {
                    self.variables.push((each.clone(), Data::from_u64(index)));
                    let result = self.resolve_pointer(is);
                    self.variables.pop();
                    result?;
                }
                Ok(())
            }

            Pointer::Conditional {
                condition,
                then,
                otherwise,
            } => {
                // Truthiness is an explicit test against zero.
                if !self.evaluate(condition)?.is_zero() {
                    self.resolve_pointer(then)
                } else if let Some(otherwise) = otherwise {
                    self.resolve_pointer(otherwise)
                } else {
                    Ok(())
                }
            }

            Pointer::Scope { define, body } => {
                // Definitions evaluate in order and may use earlier ones.
                let base = self.variables.len();
                for (name, expr) in define {
                    let value = match self.evaluate(expr) {
                        Ok(value) => value,
                        Err(err) => {
                            self.variables.truncate(base);
                            return Err(err);
                        }
                    };
                    self.variables.push((name.clone(), value));
                }
                let result = self.resolve_pointer(body);
                self.variables.truncate(base);
                result
            }

            Pointer::Template(name) => {
                let template = self
                    .templates
                    .get(name)
                    .ok_or_else(|| PointerError::UnknownTemplate(name.clone()))?;
                for expected in &template.expect {
                    if !self.variables.iter().any(|(n, _)| n == expected) {
                        return Err(PointerError::UnboundTemplateVariable {
                            template: name.clone(),
                            variable: expected.clone(),
                        });
                    }
                }
                self.resolve_pointer(&template.body)
            }
        }
    }

    fn resolve_region(&mut self, region: &Region) -> Result<(), PointerError> {
        let previous = self.current.replace(PendingRegion::new(region));

        let mut forced = Ok(());
        for property in [
            RegionProperty::Slot,
            RegionProperty::Offset,
            RegionProperty::Length,
        ] {
            if let Err(err) = self.force_this_field(property) {
                forced = Err(err);
                break;
            }
        }

        let pending = self.current.take().expect("current region present");
        self.current = previous;
        forced?;

        let concrete = pending.finish();
        if let Some(name) = &concrete.name {
            self.named.insert(name.clone(), self.regions.len());
        }
        self.regions.push(concrete);
        Ok(())
    }

    /// Force one field of the in-flight region, evaluating its expression
    /// on first demand and memoizing the result. A field re-entered while
    /// still resolving is a cycle.
    fn force_this_field(
        &mut self,
        property: RegionProperty,
    ) -> Result<Option<Data>, PointerError> {
        let Some(current) = self.current.as_mut() else {
            return Err(PointerError::UnknownRegion("$this".into()));
        };

        let field = current.field_mut(property);
        let expr = match field {
            Field::Absent => return Ok(None),
            Field::Done(data) => return Ok(Some(data.clone())),
            Field::Resolving => {
                return Err(PointerError::CircularReference(property.name()));
            }
            Field::Todo(expr) => {
                let expr = expr.clone();
                *field = Field::Resolving;
                expr
            }
        };

        let value = self.evaluate(&expr)?;
        let current = self.current.as_mut().expect("current region present");
        *current.field_mut(property) = Field::Done(value.clone());
        Ok(Some(value))
    }

    fn evaluate(&mut self, expr: &Expression) -> Result<Data, PointerError> {
        match expr {
            Expression::Number(n) => Ok(Data::from_u64(*n)),
            Expression::Hex(data) => Ok(data.clone()),
            Expression::Wordsize => Ok(Data::from_u64(32)),

            Expression::Variable(name) => self
                .variables
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| PointerError::UnknownVariable(name.clone())),

            Expression::Arithmetic(op, operands) => {
                let operands = self.evaluate_all(operands)?;
                op.apply(&operands)
            }

            Expression::Keccak256(operands) => {
                let operands = self.evaluate_all(operands)?;
                Ok(keccak256_concat(&operands))
            }

            Expression::Concat(operands) => {
                let operands = self.evaluate_all(operands)?;
                Ok(operands
                    .iter()
                    .fold(Data::empty(), |acc, operand| acc.concat(operand)))
            }

            Expression::Sized { size, expr } => Ok(self.evaluate(expr)?.resize(*size)),
            Expression::Wordsized(expr) => Ok(self.evaluate(expr)?.resize(32)),

            Expression::Lookup { property, region } => {
                if region == "$this" {
                    return self.force_this_field(*property)?.ok_or_else(|| {
                        PointerError::MissingRegionProperty {
                            region: "$this".into(),
                            property: property.name(),
                        }
                    });
                }
                let found = self.lookup_region(region)?;
                found
                    .property(*property)
                    .cloned()
                    .ok_or_else(|| PointerError::MissingRegionProperty {
                        region: region.clone(),
                        property: property.name(),
                    })
            }

            Expression::Read(region) => {
                let found = self.lookup_region(region)?.clone();
                read_region(self.state, &found)
            }
        }
    }

    /// Operands evaluate left to right; a sibling's name is visible to the
    /// operands after it, never before.
    fn evaluate_all(&mut self, exprs: &[Expression]) -> Result<Vec<Data>, PointerError> {
        exprs.iter().map(|e| self.evaluate(e)).collect()
    }

    fn lookup_region(&self, name: &str) -> Result<&CursorRegion, PointerError> {
        self.named
            .get(name)
            .map(|&index| &self.regions[index])
            .ok_or_else(|| PointerError::UnknownRegion(name.to_string()))
    }
}
