//! Fully evaluated regions and the cursor that produces them.

use indexmap::IndexMap;

use crate::{
    data::Data,
    dereference::resolve,
    error::PointerError,
    expression::RegionProperty,
    machine::MachineState,
    pointer::{Location, Pointer, Template},
    read::read_region,
};

/// A concrete region: location plus evaluated slot/offset/length. Only the
/// fields relevant to the location are present. Created fresh per
/// machine-state view and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorRegion {
    pub name: Option<String>,
    pub location: Location,
    pub slot: Option<Data>,
    pub offset: Option<Data>,
    pub length: Option<Data>,
}

impl CursorRegion {
    pub fn property(&self, property: RegionProperty) -> Option<&Data> {
        match property {
            RegionProperty::Slot => self.slot.as_ref(),
            RegionProperty::Offset => self.offset.as_ref(),
            RegionProperty::Length => self.length.as_ref(),
        }
    }
}

/// The ordered list of regions a view produced. Order is declaration order:
/// depth-first, group-member order, list indices ascending. Multiple regions
/// may share a name (list elements do); `named` returns all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Regions(Vec<CursorRegion>);

impl Regions {
    pub(crate) fn new(regions: Vec<CursorRegion>) -> Self {
        Self(regions)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CursorRegion> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&CursorRegion> {
        self.0.get(index)
    }

    /// Every region carrying `name`, in declaration order.
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CursorRegion> {
        self.0
            .iter()
            .filter(move |r| r.name.as_deref() == Some(name))
    }

    /// The most recently declared region named `name`.
    pub fn named_latest(&self, name: &str) -> Option<&CursorRegion> {
        self.0
            .iter()
            .rev()
            .find(|r| r.name.as_deref() == Some(name))
    }
}

impl<'a> IntoIterator for &'a Regions {
    type Item = &'a CursorRegion;
    type IntoIter = std::slice::Iter<'a, CursorRegion>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A pointer bound to its templates, ready to view against machine states.
///
/// Views are pure functions of (cursor, state): the same cursor may be
/// viewed against any number of states without interference.
#[derive(Debug, Clone)]
pub struct Cursor {
    pointer: Pointer,
    templates: IndexMap<String, Template>,
}

impl Cursor {
    pub(crate) fn new(pointer: Pointer, templates: IndexMap<String, Template>) -> Self {
        Self { pointer, templates }
    }

    pub fn pointer(&self) -> &Pointer {
        &self.pointer
    }

    /// Resolve every region against `state`.
    pub fn view<'a, S: MachineState>(
        &self,
        state: &'a S,
    ) -> Result<CursorView<'a, S>, PointerError> {
        let regions = resolve(&self.pointer, &self.templates, state)?;
        Ok(CursorView { regions, state })
    }
}

/// One resolved view: the region list plus the state to read from.
#[derive(Debug)]
pub struct CursorView<'a, S: MachineState> {
    pub regions: Regions,
    state: &'a S,
}

impl<S: MachineState> CursorView<'_, S> {
    pub fn read(&self, region: &CursorRegion) -> Result<Data, PointerError> {
        read_region(self.state, region)
    }
}
