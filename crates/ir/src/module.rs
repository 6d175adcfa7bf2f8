//! Module definition: the unit of compilation.

use indexmap::IndexMap;

use crate::function::Function;

/// A compilation unit: an optional constructor, the `main` entrypoint, and
/// named user functions in declaration order.
#[derive(Debug, Clone)]
pub struct Module {
    /// Constructor body, run once at deployment.
    pub create: Option<Function>,
    /// Runtime entrypoint.
    pub main: Function,
    /// User functions, callable from `main` and from each other.
    pub functions: IndexMap<String, Function>,
}

impl Module {
    pub fn new(main: Function) -> Self {
        Self {
            create: None,
            main,
            functions: IndexMap::new(),
        }
    }

    pub fn add_function(&mut self, func: Function) {
        self.functions.insert(func.name.clone(), func);
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// All function bodies: `create` (if present), `main`, then user
    /// functions in declaration order.
    pub fn iter_functions(&self) -> impl Iterator<Item = &Function> {
        self.create
            .iter()
            .chain(std::iter::once(&self.main))
            .chain(self.functions.values())
    }

    pub fn iter_functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.create
            .iter_mut()
            .chain(std::iter::once(&mut self.main))
            .chain(self.functions.values_mut())
    }
}
