//! Explicit property paths
//!
//! A [`Lens<Root, Leaf>`] is a pair of pure functions: `get` reads a leaf out
//! of a root value, `with` rebuilds the root with the leaf replaced. Derived
//! bindings use lenses to project a field out of a parent binding and to
//! write changes back into it.
//!
//! ```ignore
//! #[derive(Clone)]
//! struct Profile { name: String, age: u32 }
//!
//! let age = lens!(Profile, age);
//! let p = Profile { name: "A".into(), age: 1 };
//! assert_eq!(age.get(&p), 1);
//! assert_eq!(age.with(&p, 2).age, 2);
//! ```

use std::fmt;
use std::sync::Arc;

type GetFn<Root, Leaf> = Arc<dyn Fn(&Root) -> Leaf + Send + Sync>;
type WithFn<Root, Leaf> = Arc<dyn Fn(&Root, Leaf) -> Root + Send + Sync>;

/// A getter/wither pair focusing on one part of `Root`
pub struct Lens<Root, Leaf> {
    get: GetFn<Root, Leaf>,
    with: WithFn<Root, Leaf>,
}

impl<Root, Leaf> Clone for Lens<Root, Leaf> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            with: Arc::clone(&self.with),
        }
    }
}

impl<Root: 'static, Leaf: 'static> Lens<Root, Leaf> {
    pub fn new<G, W>(get: G, with: W) -> Self
    where
        G: Fn(&Root) -> Leaf + Send + Sync + 'static,
        W: Fn(&Root, Leaf) -> Root + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            with: Arc::new(with),
        }
    }

    /// Build a lens from a field reader and an in-place field writer
    pub fn field<G, S>(get: G, set: S) -> Self
    where
        Root: Clone,
        G: Fn(&Root) -> Leaf + Send + Sync + 'static,
        S: Fn(&mut Root, Leaf) + Send + Sync + 'static,
    {
        Self::new(get, move |root: &Root, leaf: Leaf| {
            let mut next = root.clone();
            set(&mut next, leaf);
            next
        })
    }

    pub fn get(&self, root: &Root) -> Leaf {
        (self.get)(root)
    }

    /// `root` with the focused part replaced by `leaf`
    pub fn with(&self, root: &Root, leaf: Leaf) -> Root {
        (self.with)(root, leaf)
    }

    /// Focus further into the leaf
    pub fn then<Next: 'static>(self, next: Lens<Leaf, Next>) -> Lens<Root, Next> {
        let outer_get = Arc::clone(&self.get);
        let inner_get = Arc::clone(&next.get);
        let outer = self;
        Lens {
            get: Arc::new(move |root: &Root| inner_get(&outer_get(root))),
            with: Arc::new(move |root: &Root, leaf: Next| {
                let current = outer.get(root);
                outer.with(root, next.with(&current, leaf))
            }),
        }
    }
}

impl<T: Clone + 'static> Lens<T, T> {
    /// The lens that focuses on the whole value
    pub fn identity() -> Self {
        Self::new(T::clone, |_root: &T, leaf: T| leaf)
    }
}

impl<Root, Leaf> fmt::Debug for Lens<Root, Leaf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lens")
            .field("root", &std::any::type_name::<Root>())
            .field("leaf", &std::any::type_name::<Leaf>())
            .finish()
    }
}

/// Create a [`Lens`] for a (possibly nested) field path
///
/// # Examples
///
/// ```ignore
/// let age = lens!(Profile, age);
/// let city = lens!(Profile, address.city);
/// ```
#[macro_export]
macro_rules! lens {
    ($root:ty, $($field:ident).+) => {
        $crate::lens::Lens::<$root, _>::field(
            |root: &$root| root.$($field).+.clone(),
            |root: &mut $root, value| root.$($field).+ = value,
        )
    };
}
