//! Printer for the text notation.

use rustc_hash::FxHashMap;

use crate::model::{is_symbol_name, Frame, FrameId, Value};
use crate::store::Store;
use crate::text::PrintOptions;

/// Prints values of one store.
///
/// Anonymous frames reached more than once within a printed value, including
/// through a cycle, are declared `=#N` where first printed and written `#N`
/// afterwards. Named frames nested inside another frame are printed by name.
#[derive(Debug)]
pub struct Printer<'s> {
    store: &'s Store,
    options: PrintOptions,
    out: String,
    /// How often each anonymous frame is reached in the current value.
    visits: FxHashMap<FrameId, u32>,
    labels: FxHashMap<FrameId, u64>,
    next_label: u64,
}

impl<'s> Printer<'s> {
    pub fn new(store: &'s Store, options: PrintOptions) -> Self {
        Self {
            store,
            options,
            out: String::new(),
            visits: FxHashMap::default(),
            labels: FxHashMap::default(),
            next_label: 1,
        }
    }

    /// Appends `value` to the output. Values after the first start on a new
    /// line.
    pub fn print(&mut self, value: &Value) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        self.visits.clear();
        self.labels.clear();
        self.next_label = 1;
        self.scan(value, 0);
        self.value(value, 0);
    }

    /// Returns the printed text.
    pub fn finish(self) -> String {
        self.out
    }

    /// Counts visits to anonymous frames, descending into each only once.
    fn scan(&mut self, value: &Value, depth: usize) {
        let store = self.store;
        match value {
            Value::Frame(handle) => {
                let Some(frame) = store.get(*handle) else {
                    return;
                };
                if depth > 0 && self.prints_as_name(*handle, frame) {
                    return;
                }
                let count = self.visits.entry(*handle).or_insert(0);
                *count += 1;
                if *count > 1 || depth >= self.options.max_depth {
                    return;
                }
                for slot in frame.slots() {
                    self.scan(&slot.name, depth + 1);
                    self.scan(&slot.value, depth + 1);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.scan(item, depth);
                }
            }
            Value::Qualified(q) => self.scan(&q.qualifier, depth),
            _ => {}
        }
    }

    fn prints_as_name(&self, handle: FrameId, frame: &Frame) -> bool {
        !frame.is_anonymous() && self.store.id_of(handle).is_some()
    }

    fn value(&mut self, value: &Value, depth: usize) {
        match value {
            Value::Null => self.out.push_str("nil"),
            Value::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Value::Int(i) => self.out.push_str(&i.to_string()),
            Value::Float(f) => self.out.push_str(&format_float(*f)),
            Value::Str(s) => self.string(s),
            Value::Qualified(q) => {
                self.string(&q.text);
                self.out.push('@');
                self.value(&q.qualifier, depth);
            }
            Value::Array(items) => {
                self.out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.value(item, depth);
                }
                self.out.push(']');
            }
            Value::Frame(handle) => self.frame(*handle, depth),
        }
    }

    fn frame(&mut self, handle: FrameId, depth: usize) {
        let store = self.store;
        let Some(frame) = store.get(handle) else {
            self.out.push_str("nil");
            return;
        };
        if depth > 0 && !frame.is_anonymous() {
            if let Some(name) = store.id_of(handle) {
                self.symbol(name);
                return;
            }
        }
        if let Some(label) = self.labels.get(&handle) {
            self.out.push('#');
            self.out.push_str(&label.to_string());
            return;
        }
        if depth >= self.options.max_depth {
            self.out.push_str("nil");
            return;
        }

        let mut items = 0;
        self.out.push('{');
        if self.visits.get(&handle).is_some_and(|n| *n > 1) {
            let label = self.next_label;
            self.next_label += 1;
            self.labels.insert(handle, label);
            self.item(depth, &mut items);
            self.out.push_str("=#");
            self.out.push_str(&label.to_string());
        }
        for slot in frame.slots() {
            self.item(depth, &mut items);
            match (&slot.name, &slot.value) {
                (Value::Frame(FrameId::ID), Value::Str(id)) => {
                    self.out.push('=');
                    self.symbol(id);
                }
                (Value::Frame(FrameId::ISA), value) => {
                    self.out.push(':');
                    self.value(value, depth + 1);
                }
                (name, value) => {
                    self.value(name, depth + 1);
                    self.out.push_str(": ");
                    self.value(value, depth + 1);
                }
            }
        }
        if items > 0 && self.options.indent > 0 {
            self.newline(depth);
        }
        self.out.push('}');
    }

    /// Writes the separator before the next slot of a frame at `depth`.
    fn item(&mut self, depth: usize, items: &mut usize) {
        if self.options.indent > 0 {
            self.newline(depth + 1);
        } else if *items > 0 {
            self.out.push(' ');
        }
        *items += 1;
    }

    fn newline(&mut self, level: usize) {
        self.out.push('\n');
        for _ in 0..level * self.options.indent {
            self.out.push(' ');
        }
    }

    fn string(&mut self, s: &str) {
        let json = serde_json::Value::String(s.to_string());
        self.out.push_str(&json.to_string());
    }

    fn symbol(&mut self, name: &str) {
        if is_symbol_name(name) {
            self.out.push_str(name);
        } else {
            self.out.push('$');
            self.string(name);
        }
    }
}

/// Formats a float so that reading it back gives the same value.
fn format_float(f: f32) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        let word = if f > 0.0 { "inf" } else { "-inf" };
        word.to_string()
    } else {
        format!("{f:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FrameBuilder;

    #[test]
    fn test_scalars() {
        let store = Store::new();
        let cases = [
            (Value::Null, "nil"),
            (Value::Bool(true), "true"),
            (Value::Int(-7), "-7"),
            (Value::Float(1.0), "1.0"),
            (Value::Float(f32::NEG_INFINITY), "-inf"),
            (Value::Float(f32::NAN), "nan"),
            (Value::from("a \"q\"\n"), r#""a \"q\"\n""#),
            (Value::Array(vec![1i64.into(), 2i64.into()]), "[1, 2]"),
            (Value::Array(vec![]), "[]"),
        ];
        for (value, expected) in cases {
            assert_eq!(store.text(&value), expected);
        }
    }

    #[test]
    fn test_names_needing_quotes() {
        let mut store = Store::new();
        let odd = store.lookup("two words");
        let kw = store.lookup("nil");
        let holder = FrameBuilder::new().slot(odd, kw).build(&mut store);
        assert_eq!(
            store.text(&Value::Frame(holder)),
            r#"{$"two words": $"nil"}"#
        );
    }

    #[test]
    fn test_top_level_named_frame_printed_in_full() {
        let mut store = Store::new();
        let x = FrameBuilder::new().id("x").build(&mut store);
        store.get_mut(x).unwrap().add(FrameId::IS, x);
        assert_eq!(store.text(&Value::Frame(x)), "{=x is: x}");
        let outer = FrameBuilder::new().is(x).build(&mut store);
        assert_eq!(store.text(&Value::Frame(outer)), "{is: x}");
    }

    #[test]
    fn test_shared_anonymous_frames_labeled() {
        let mut store = Store::new();
        let shared = FrameBuilder::new().is(1i64).build(&mut store);
        let other = FrameBuilder::new().is(2i64).build(&mut store);
        let root = FrameBuilder::new()
            .slot("a", shared)
            .slot("b", other)
            .slot("c", shared)
            .build(&mut store);
        assert_eq!(
            store.text(&Value::Frame(root)),
            r#"{"a": {=#1 is: 1} "b": {is: 2} "c": #1}"#
        );
    }

    #[test]
    fn test_labels_reset_per_value() {
        let mut store = Store::new();
        let shared = FrameBuilder::new().is(1i64).build(&mut store);
        let pair = Value::Array(vec![shared.into(), shared.into()]);
        let mut printer = Printer::new(&store, PrintOptions::default());
        printer.print(&pair);
        printer.print(&pair);
        assert_eq!(
            printer.finish(),
            "[{=#1 is: 1}, #1]\n[{=#1 is: 1}, #1]"
        );
    }

    #[test]
    fn test_empty_frame() {
        let mut store = Store::new();
        let f = store.frame(vec![]);
        assert_eq!(store.text(&Value::Frame(f)), "{}");
        assert_eq!(store.text_with(&Value::Frame(f), &PrintOptions::pretty()), "{}");
    }
}
