// stackfreeze - Freeze-the-world stack snapshots
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Scope registry
//!
//! Rust frames carry no reflective view of their locals, so a function opts in by
//! running its body inside a [`Scope`]. The scope lends shared references to the locals
//! it names and sits on a thread-local shadow stack for exactly as long as the body
//! runs. A capture started from inside the body reads those references through
//! [`with_scopes`] and never keeps them past its own return.
//!
//! ```rust,ignore
//! fn restock(&self, item: &str, quantity: u32) -> Result<()> {
//!     stackfreeze::scope!(self, item, quantity => {
//!         self.audit(item)
//!     })
//! }
//! ```

use std::{borrow::Cow, cell::RefCell, marker::PhantomData, panic::Location};

use stackfreeze_common::Inspect;
use tracing::trace;

thread_local! {
    static SCOPES: RefCell<Vec<ScopeEntry>> = const { RefCell::new(Vec::new()) };
}

/// A registered scope with its lent locals, lifetime-erased
struct ScopeEntry {
    function: Cow<'static, str>,
    location: &'static Location<'static>,
    locals: Vec<(Cow<'static, str>, *const (dyn Inspect + 'static))>,
}

/// A region of user code that lends its locals to captures started inside it
#[must_use = "a scope only registers its locals while `run` executes"]
pub struct Scope<'a> {
    function: Cow<'static, str>,
    location: &'static Location<'static>,
    locals: Vec<(Cow<'static, str>, &'a dyn Inspect)>,
}

impl<'a> Scope<'a> {
    /// Open a scope for `function`; the caller's location is recorded as its entry line
    #[track_caller]
    pub fn new(function: impl Into<Cow<'static, str>>) -> Self {
        Self { function: function.into(), location: Location::caller(), locals: Vec::new() }
    }

    /// Lend a local under `name`
    pub fn local(mut self, name: impl Into<Cow<'static, str>>, value: &'a dyn Inspect) -> Self {
        self.locals.push((name.into(), value));
        self
    }

    /// Run `body` with this scope registered
    pub fn run<R>(self, body: impl FnOnce() -> R) -> R {
        let locals = self
            .locals
            .into_iter()
            .map(|(name, value)| {
                let value: *const (dyn Inspect + 'a) = value;
                // SAFETY: only the lifetime bound is erased. The entry is popped by
                // `ScopeGuard` before `run` returns or unwinds, and `'a` outlives this
                // call, so the pointer is never dereferenced after the borrow ends.
                let value: *const (dyn Inspect + 'static) = unsafe { std::mem::transmute(value) };
                (name, value)
            })
            .collect();
        let entry = ScopeEntry { function: self.function, location: self.location, locals };

        trace!(function = %entry.function, line = entry.location.line(), "entering scope");
        let depth = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            scopes.push(entry);
            scopes.len() - 1
        });
        let _guard = ScopeGuard { depth, _not_send: PhantomData };

        body()
    }
}

/// Pops the scope pushed by [`Scope::run`], also during unwinding
struct ScopeGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let _ = SCOPES.try_with(|scopes| scopes.borrow_mut().truncate(self.depth));
    }
}

/// Read-only view of a registered scope
#[derive(Clone, Copy)]
pub struct ScopeView<'s> {
    entry: &'s ScopeEntry,
}

impl<'s> ScopeView<'s> {
    /// Function name the scope was opened with
    pub fn function(&self) -> &'s str {
        &self.entry.function
    }

    /// Source file of the scope, as given by `file!()`
    pub fn file(&self) -> &'static str {
        self.entry.location.file()
    }

    /// Line the scope was opened on
    pub fn line(&self) -> u32 {
        self.entry.location.line()
    }

    /// Lent locals in registration order
    pub fn locals(&self) -> impl Iterator<Item = (&'s str, &'s dyn Inspect)> + 's {
        self.entry.locals.iter().map(|(name, value)| {
            // SAFETY: a view only exists inside `with_scopes`, while the entry is still
            // registered, so the lending `Scope::run` call has not returned yet.
            let value: &'s dyn Inspect = unsafe { &**value };
            (name.as_ref(), value)
        })
    }

    /// Number of lent locals
    pub fn len(&self) -> usize {
        self.entry.locals.len()
    }

    /// Whether the scope lends no locals
    pub fn is_empty(&self) -> bool {
        self.entry.locals.is_empty()
    }
}

impl std::fmt::Debug for ScopeView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeView")
            .field("function", &self.function())
            .field("file", &self.file())
            .field("line", &self.line())
            .field("locals", &self.entry.locals.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

/// Run `f` over the scopes registered on this thread, innermost first
///
/// Scopes cannot be opened from inside `f`.
pub fn with_scopes<R>(f: impl FnOnce(&[ScopeView<'_>]) -> R) -> R {
    SCOPES.with(|scopes| {
        let scopes = scopes.borrow();
        let views: Vec<ScopeView<'_>> =
            scopes.iter().rev().map(|entry| ScopeView { entry }).collect();
        f(&views)
    })
}

/// Number of scopes registered on this thread
pub fn depth() -> usize {
    SCOPES.with(|scopes| scopes.borrow().len())
}

/// Strip the helper item and any closure segments from a `type_name` path
///
/// `app::orders::restock::{{closure}}::f` becomes `app::orders::restock`.
pub fn trim_function_name(raw: &str) -> &str {
    let mut name = raw.strip_suffix("::f").unwrap_or(raw);
    while let Some(outer) = name.strip_suffix("::{{closure}}") {
        name = outer;
    }
    name
}

/// Path of the enclosing function, e.g. `app::orders::Inventory::restock`
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        $crate::registry::trim_function_name(::std::any::type_name_of_val(&f))
    }};
}

/// Run a block with the named locals lent to captures started inside it
///
/// ```rust,ignore
/// let order = load_order(id)?;
/// let retries = 3;
/// stackfreeze::scope!(order, retries => {
///     submit(&order, retries)
/// })
/// ```
///
/// The block runs inside a closure: `return` leaves the block, not the function,
/// and `?` needs the block's value to be a `Result`.
#[macro_export]
macro_rules! scope {
    ($body:block) => {
        $crate::registry::Scope::new($crate::function_name!()).run(|| $body)
    };
    ($($name:ident),+ $(,)? => $body:block) => {
        $crate::registry::Scope::new($crate::function_name!())
            $(.local(stringify!($name), &$name))+
            .run(|| $body)
    };
}
