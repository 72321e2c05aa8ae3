use std::mem;

use islet_core::Value;

enum Slot<'a> {
    Owned(Value),
    Borrowed(&'a Value),
}

/// The resource table of one run.
///
/// Holds the current value of every data node of the island, indexed by
/// resource slot. External inputs are borrowed from the caller for the
/// lifetime `'a` of the run. Output objects are held until
/// [`Magazine::finish`], which fills them only if the run committed; internal
/// values live and die here.
pub struct Magazine<'a> {
    slots: Vec<Slot<'a>>,
    write_back: Vec<(usize, &'a mut Value)>,
}

impl<'a> Magazine<'a> {
    pub fn new(len: usize) -> Self {
        Magazine {
            slots: (0..len).map(|_| Slot::Owned(Value::Empty)).collect(),
            write_back: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_bound(&self, slot: usize) -> bool {
        matches!(self.slots[slot], Slot::Borrowed(_))
            || self.write_back.iter().any(|(s, _)| *s == slot)
    }

    /// Bind an external input. Returns `false` if the slot is already bound.
    pub fn bind_input(&mut self, slot: usize, value: &'a Value) -> bool {
        if self.is_bound(slot) {
            return false;
        }
        self.slots[slot] = Slot::Borrowed(value);
        true
    }

    /// Bind a caller output object.
    ///
    /// The slot starts empty, so the step allocates a fresh value from the
    /// node's metadata. A matrix is the exception: the slot shares its handle
    /// and the kernel writes straight into the caller's storage. The caller's
    /// object itself is left alone until [`Magazine::finish`].
    pub fn bind_output(&mut self, slot: usize, value: &'a mut Value) -> bool {
        if self.is_bound(slot) {
            return false;
        }
        let initial = match &*value {
            Value::Mat(m) => Value::Mat(m.clone()),
            _ => Value::Empty,
        };
        self.slots[slot] = Slot::Owned(initial);
        self.write_back.push((slot, value));
        true
    }

    pub fn get(&self, slot: usize) -> &Value {
        match &self.slots[slot] {
            Slot::Owned(v) => v,
            Slot::Borrowed(v) => *v,
        }
    }

    /// Move a value out, leaving the slot empty. Borrowed inputs are never
    /// taken; they yield an empty value.
    pub fn take(&mut self, slot: usize) -> Value {
        match &mut self.slots[slot] {
            Slot::Owned(v) => mem::take(v),
            Slot::Borrowed(_) => Value::Empty,
        }
    }

    pub fn put(&mut self, slot: usize, value: Value) {
        self.slots[slot] = Slot::Owned(value);
    }

    /// End the run and return what is left: the values of every owned slot
    /// not handed to the caller, by slot index.
    ///
    /// With `commit`, output values are moved into the caller's objects.
    /// Without it the caller's objects keep the values they had when bound.
    pub fn finish(mut self, commit: bool) -> Vec<(usize, Value)> {
        let write_back = mem::take(&mut self.write_back);
        if commit {
            for (slot, dst) in write_back {
                if let Slot::Owned(v) = &mut self.slots[slot] {
                    *dst = mem::take(v);
                }
            }
        }
        self.slots
            .into_iter()
            .enumerate()
            .filter_map(|(slot, s)| match s {
                Slot::Owned(Value::Empty) | Slot::Borrowed(_) => None,
                Slot::Owned(v) => Some((slot, v)),
            })
            .collect()
    }
}
