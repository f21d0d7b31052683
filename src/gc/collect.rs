use std::mem;

use log::{debug, trace};

use super::{
    Heap,
    roots::Pending,
    space::Space,
    value::{Value, ValueRef},
};

/// Which reference field of a relocated cell a trail site patches.
#[derive(Clone, Copy, Debug)]
enum Field {
    Head,
    Tail,
    Params,
    Body,
    Env,
}

/// A deferred reference field: `cell` already lives in the target space but
/// `field` still refers into the source space. Sites are queued on the
/// trail and consumed before the pass ends.
#[derive(Clone, Copy, Debug)]
pub(super) struct Site {
    cell: ValueRef,
    field: Field,
}

/// One collection pass over the two spaces. Borrows the spaces and the
/// trail buffer from the heap; root patching happens in [`Heap::collect`].
struct Pass<'h> {
    from: &'h mut Space,
    to: &'h mut Space,
    trail: &'h mut Vec<Site>,
}

impl Heap {
    /// Runs a full trace-and-relocate pass over the three root sources and
    /// flips the spaces. Every rooted reference is patched to its new
    /// location; everything unreachable is garbage once the pass ends.
    pub fn collect(&mut self) {
        debug!("performing collection");

        self.retired.reset();
        debug_assert!(self.trail.is_empty());

        let mut pass = Pass {
            from: &mut self.active,
            to: &mut self.retired,
            trail: &mut self.trail,
        };

        self.roots.global_env = pass.relocate(self.roots.global_env);

        for idx in 0..self.roots.pending.len() {
            if let Pending::Value(cell) = self.roots.pending.get(idx) {
                let moved = pass.relocate(cell);
                self.roots.pending.set(idx, Pending::Value(moved));
            }
        }

        for idx in 0..self.roots.shadow.len() {
            let moved = pass.relocate(self.roots.shadow.get_at(idx));
            self.roots.shadow.set_at(idx, moved);
        }

        mem::swap(&mut self.active, &mut self.retired);

        let retained = (self.active.len() * mem::size_of::<Value>()) as u64;
        self.counters.collections += 1;
        self.counters.retained_bytes += retained;

        debug!(
            "collection finished: {retained} bytes retained, {:.2} heap used",
            self.occupancy()
        );
    }
}

impl Pass<'_> {
    /// Relocates the whole object graph reachable from `old` and returns
    /// its new location. Iterative: the primary reference field of each
    /// freshly copied cell is followed immediately, the remaining fields
    /// wait on the trail, and a path bottoms out at any cell without
    /// reference fields.
    fn relocate(&mut self, old: ValueRef) -> ValueRef {
        let (new_root, fresh) = self.evacuate(old);

        if !fresh {
            return new_root;
        }

        let Some(mut site) = self.descend(new_root) else {
            return new_root;
        };

        loop {
            let (moved, fresh) = self.evacuate(self.read(site));
            self.write(site, moved);

            let next = if fresh { self.descend(moved) } else { None };

            match next.or_else(|| self.trail.pop()) {
                Some(next) => site = next,
                None => break,
            }
        }

        new_root
    }

    /// Copies `old`'s cell into the target space, leaving a forwarding
    /// record over the vacated slot, or chases an existing forwarding
    /// record. Returns the destination and whether this call copied.
    ///
    /// The forwarding records written during a pass are the old-to-new copy
    /// mapping: a second visit to an evacuated cell redirects to the one
    /// recorded destination, which is what keeps aliased and cyclic
    /// structures shared rather than duplicated.
    fn evacuate(&mut self, old: ValueRef) -> (ValueRef, bool) {
        match self.from.get(old) {
            Value::Forwarded(new) => {
                assert!(
                    new.index() < self.to.len(),
                    "forwarding record at {old:?} points outside the target space"
                );

                (new, false)
            }
            live => {
                // Cannot fail: the live set is bounded by the source
                // space's occupancy and the spaces have equal capacity.
                let new = self
                    .to
                    .bump(live)
                    .expect("target space filled up during a collection pass");
                self.from.set(old, Value::Forwarded(new));

                (new, true)
            }
        }
    }

    /// Queues the deferred reference fields of a freshly copied cell on the
    /// trail and returns the site of the field to follow first, or `None`
    /// for cells without reference fields.
    fn descend(&mut self, new: ValueRef) -> Option<Site> {
        match self.to.get(new) {
            Value::Pair { .. } => {
                trace!("pair at {new:?}: following head, deferring tail");

                self.trail.push(Site {
                    cell: new,
                    field: Field::Tail,
                });

                Some(Site {
                    cell: new,
                    field: Field::Head,
                })
            }
            Value::Closure { .. } | Value::Macro { .. } => {
                trace!("closure at {new:?}: following params, deferring body and environment");

                self.trail.push(Site {
                    cell: new,
                    field: Field::Env,
                });
                self.trail.push(Site {
                    cell: new,
                    field: Field::Body,
                });

                Some(Site {
                    cell: new,
                    field: Field::Params,
                })
            }
            _ => None,
        }
    }

    fn read(&self, site: Site) -> ValueRef {
        match (self.to.get(site.cell), site.field) {
            (Value::Pair { head, .. }, Field::Head) => head,
            (Value::Pair { tail, .. }, Field::Tail) => tail,
            (Value::Closure { params, .. } | Value::Macro { params, .. }, Field::Params) => params,
            (Value::Closure { body, .. } | Value::Macro { body, .. }, Field::Body) => body,
            (Value::Closure { env, .. } | Value::Macro { env, .. }, Field::Env) => env,
            (value, field) => unreachable!("trail site {field:?} does not match cell {value:?}"),
        }
    }

    fn write(&mut self, site: Site, moved: ValueRef) {
        let mut cell = self.to.get(site.cell);

        match (&mut cell, site.field) {
            (Value::Pair { head, .. }, Field::Head) => *head = moved,
            (Value::Pair { tail, .. }, Field::Tail) => *tail = moved,
            (Value::Closure { params, .. } | Value::Macro { params, .. }, Field::Params) => {
                *params = moved
            }
            (Value::Closure { body, .. } | Value::Macro { body, .. }, Field::Body) => *body = moved,
            (Value::Closure { env, .. } | Value::Macro { env, .. }, Field::Env) => *env = moved,
            (value, field) => unreachable!("trail site {field:?} does not match cell {value:?}"),
        }

        self.to.set(site.cell, cell);
    }
}
