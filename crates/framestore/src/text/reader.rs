//! Reader for the text notation.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::ParseError;
use crate::limits::MAX_DEPTH;
use crate::model::{Frame, FrameId, QString, Slot, Value};
use crate::store::Store;
use crate::text::lexer::{Lexer, Tok, Token};

/// A `#N` local frame of the current top-level value.
#[derive(Debug, Clone, Copy)]
struct Local {
    handle: FrameId,
    defined: bool,
}

/// Streaming reader building frames in a store.
///
/// Like the binary decoder, each [`TextReader::read`] call is atomic.
#[derive(Debug)]
pub struct TextReader<'s, 'a> {
    store: &'s mut Store,
    lexer: Lexer<'a>,
    peeked: Option<Token>,
    locals: FxHashMap<u64, Local>,
    /// Placeholders that turned out to be existing frames.
    aliases: Vec<(FrameId, FrameId)>,
    /// Frames whose content was set by the current value.
    touched: Vec<FrameId>,
    depth: usize,
}

impl<'s, 'a> TextReader<'s, 'a> {
    pub fn new(store: &'s mut Store, input: &'a str) -> Self {
        Self {
            store,
            lexer: Lexer::new(input),
            peeked: None,
            locals: FxHashMap::default(),
            aliases: Vec::new(),
            touched: Vec::new(),
            depth: 0,
        }
    }

    /// Reads the next top-level value, or `None` at the end of the input.
    pub fn read(&mut self) -> Result<Option<Value>, ParseError> {
        if self.peek()?.tok == Tok::Eof {
            return Ok(None);
        }
        let owned = self.store.begin();
        let start = self.store.next_handle();
        let result = self.read_unit(start);
        self.locals.clear();
        self.aliases.clear();
        self.touched.clear();
        self.depth = 0;
        match result {
            Ok(value) => {
                if owned {
                    self.store.commit();
                }
                Ok(Some(value))
            }
            Err(err) => {
                debug!(error = %err, "parse failed");
                self.peeked = None;
                if owned {
                    self.store.rollback();
                }
                Err(err)
            }
        }
    }

    /// Reads every remaining value and returns the last one.
    ///
    /// Returns [`Value::Null`] for empty input.
    pub fn read_all(&mut self) -> Result<Value, ParseError> {
        let mut last = Value::Null;
        let mut count = 0usize;
        while let Some(value) = self.read()? {
            last = value;
            count += 1;
        }
        debug!(values = count, "parsed text");
        Ok(last)
    }

    fn peek(&mut self) -> Result<&Token, ParseError> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        Ok(self.peeked.insert(token))
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn read_unit(&mut self, start: FrameId) -> Result<Value, ParseError> {
        let mut value = self.read_value()?;

        if let Some(index) = self
            .locals
            .iter()
            .filter(|(_, local)| !local.defined)
            .map(|(index, _)| *index)
            .min()
        {
            return Err(ParseError::UndefinedLocal { index });
        }

        for &(from, to) in &self.aliases {
            trace!(?from, ?to, "redirecting local placeholder");
            self.store.redirect(start, from, to);
            for handle in &self.touched {
                if *handle < start {
                    self.store.rewrite(*handle, from, to);
                }
            }
            value.replace_frame(from, to);
        }
        for &(from, _) in &self.aliases {
            self.store.release(from);
        }
        Ok(value)
    }

    fn enter(&mut self, token: &Token) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::DepthExceeded {
                max: MAX_DEPTH,
                line: token.line,
                column: token.column,
            });
        }
        Ok(())
    }

    fn read_value(&mut self) -> Result<Value, ParseError> {
        let token = self.next()?;
        match &token.tok {
            Tok::LBrace => self.read_frame(&token),
            Tok::LBracket => self.read_array(&token),
            Tok::Str(text) => {
                let text = text.clone();
                // A qualifier must follow the closing quote directly.
                if self.lexer.at('@') && self.peeked.is_none() {
                    self.next()?;
                    self.enter(&token)?;
                    let qualifier = self.read_value()?;
                    self.depth -= 1;
                    return Ok(Value::from(QString { text, qualifier }));
                }
                Ok(Value::Str(text))
            }
            Tok::Symbol(name) => Ok(Value::Frame(self.store.lookup(name))),
            Tok::Local(index) => Ok(Value::Frame(self.local(*index))),
            Tok::Int(i) => Ok(Value::Int(*i)),
            Tok::Float(f) => Ok(Value::Float(*f)),
            Tok::Nil => Ok(Value::Null),
            Tok::True => Ok(Value::Bool(true)),
            Tok::False => Ok(Value::Bool(false)),
            _ => Err(token.unexpected("value")),
        }
    }

    /// Returns the handle of local `#index`, creating a placeholder for a
    /// forward reference.
    fn local(&mut self, index: u64) -> FrameId {
        if let Some(local) = self.locals.get(&index) {
            return local.handle;
        }
        let handle = self.store.alloc(Frame::new());
        self.locals.insert(
            index,
            Local {
                handle,
                defined: false,
            },
        );
        handle
    }

    fn read_array(&mut self, open: &Token) -> Result<Value, ParseError> {
        self.enter(open)?;
        let mut items = Vec::new();
        loop {
            match self.peek()?.tok {
                Tok::RBracket => {
                    self.next()?;
                    break;
                }
                Tok::Comma => {
                    self.next()?;
                }
                Tok::Eof => return Err(ParseError::UnexpectedEof { expected: "']'" }),
                _ => items.push(self.read_value()?),
            }
        }
        self.depth -= 1;
        Ok(Value::Array(items))
    }

    fn read_frame(&mut self, open: &Token) -> Result<Value, ParseError> {
        self.enter(open)?;
        let mut slots = Vec::new();
        let mut declared = Vec::new();
        loop {
            let token = self.next()?;
            match token.tok {
                Tok::RBrace => break,
                Tok::Comma => {}
                Tok::Colon => slots.push(Slot::new(FrameId::ISA, self.read_value()?)),
                Tok::Plus => slots.push(Slot::new(FrameId::IS, self.read_value()?)),
                Tok::Equals => {
                    let target = self.next()?;
                    match target.tok {
                        Tok::Symbol(id) | Tok::Str(id) => slots.push(Slot::new(FrameId::ID, id)),
                        Tok::Local(index) => {
                            if self.locals.get(&index).is_some_and(|l| l.defined) {
                                return Err(ParseError::DuplicateLocal {
                                    index,
                                    line: target.line,
                                    column: target.column,
                                });
                            }
                            let handle = self.local(index);
                            self.locals.insert(
                                index,
                                Local {
                                    handle,
                                    defined: true,
                                },
                            );
                            declared.push(index);
                        }
                        _ => return Err(target.unexpected("id or local after '='")),
                    }
                }
                Tok::Eof => return Err(ParseError::UnexpectedEof { expected: "'}'" }),
                _ => {
                    self.peeked = Some(token);
                    let name = self.read_value()?;
                    let colon = self.next()?;
                    if colon.tok != Tok::Colon {
                        return Err(colon.unexpected("':'"));
                    }
                    let value = self.read_value()?;
                    slots.push(Slot { name, value });
                }
            }
        }
        self.depth -= 1;

        let existing = slots
            .iter()
            .filter_map(Slot::id)
            .find_map(|id| self.store.local_binding(id));
        let placeholders: Vec<FrameId> = declared
            .iter()
            .filter_map(|index| self.locals.get(index))
            .map(|local| local.handle)
            .collect();
        let handle = match existing.or(placeholders.first().copied()) {
            Some(handle) => handle,
            None => self.store.alloc(Frame::new()),
        };
        for placeholder in placeholders {
            if placeholder != handle {
                self.aliases.push((placeholder, handle));
            }
        }
        for index in declared {
            self.locals.insert(
                index,
                Local {
                    handle,
                    defined: true,
                },
            );
        }
        self.store.install(handle, slots);
        self.touched.push(handle);
        Ok(Value::Frame(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn parse(store: &mut Store, input: &str) -> Result<Value, ParseError> {
        TextReader::new(store, input).read_all()
    }

    #[test]
    fn test_slot_shorthands() {
        let mut store = Store::new();
        let value = parse(&mut store, "{=x :person +5 name: \"X\" =$\"other name\"}").unwrap();
        let handle = value.as_frame().unwrap();
        let frame = store.get(handle).unwrap();
        let person = store.find("person").unwrap();
        assert_eq!(frame.get(FrameId::ISA), Some(&Value::Frame(person)));
        assert_eq!(frame.get(FrameId::IS), Some(&Value::Int(5)));
        assert_eq!(frame.ids().collect::<Vec<_>>(), vec!["x", "other name"]);
        assert_eq!(store.find("other name"), Some(handle));
        assert!(frame.is_public());
    }

    #[test]
    fn test_forward_local_reference() {
        let mut store = Store::new();
        let value = parse(&mut store, "[#1, {=#1 v: 1}, #1]").unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items[0], items[1]);
        assert_eq!(items[1], items[2]);
        let v = store.find("v").unwrap();
        let frame = store.get(items[0].as_frame().unwrap()).unwrap();
        assert_eq!(frame.get(v), Some(&Value::Int(1)));
    }

    #[test]
    fn test_cyclic_locals() {
        let mut store = Store::new();
        let value = parse(&mut store, "{=#1 next: {=#2 next: #1}}").unwrap();
        let a = value.as_frame().unwrap();
        let next = store.find("next").unwrap();
        let b = store.get(a).unwrap().get(next).unwrap().as_frame().unwrap();
        assert_ne!(a, b);
        assert_eq!(store.get(b).unwrap().get(next), Some(&Value::Frame(a)));
    }

    #[test]
    fn test_locals_scoped_per_value() {
        let mut store = Store::new();
        let mut reader = TextReader::new(&mut store, "{=#1 v: 1} {=#1 v: 2}");
        let a = reader.read().unwrap().unwrap();
        let b = reader.read().unwrap().unwrap();
        assert_eq!(reader.read().unwrap(), None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_undefined_local() {
        let mut store = Store::new();
        let before = store.len();
        let err = parse(&mut store, "{a: #3 b: #2}").unwrap_err();
        assert_eq!(err, ParseError::UndefinedLocal { index: 2 });
        assert_eq!(err.code(), ErrorCode::Reference);
        assert_eq!(store.len(), before);
        assert_eq!(store.find("a"), None);
    }

    #[test]
    fn test_local_aliased_to_existing_frame() {
        let mut store = Store::new();
        let x = store.lookup("x");
        let value = parse(&mut store, "[#1, {=#1 =x self: #1}]").unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items[0], Value::Frame(x));
        assert_eq!(items[1], Value::Frame(x));
        let me = store.find("self").unwrap();
        assert_eq!(store.get(x).unwrap().get(me), Some(&Value::Frame(x)));
    }

    #[test]
    fn test_duplicate_local_declaration() {
        let mut store = Store::new();
        let before = store.len();
        let err = parse(&mut store, "[{=#1 a: 1}, {=#1 b: 2}]").unwrap_err();
        assert_eq!(
            err,
            ParseError::DuplicateLocal {
                index: 1,
                line: 1,
                column: 16,
            }
        );
        assert_eq!(store.len(), before);

        // Nested redeclaration is caught before the inner frame closes.
        let err = parse(&mut store, "{=#1 inner: {=#1}}").unwrap_err();
        assert!(matches!(err, ParseError::DuplicateLocal { index: 1, .. }));
    }

    #[test]
    fn test_two_locals_on_one_frame() {
        let mut store = Store::new();
        let value = parse(&mut store, "[#2, {=#1 =#2 self: #1}]").unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items[0], items[1]);
        let me = store.find("self").unwrap();
        let handle = items[1].as_frame().unwrap();
        assert_eq!(store.get(handle).unwrap().get(me), Some(&items[1]));
    }

    #[test]
    fn test_aliased_placeholders_released() {
        let mut store = Store::new();
        let x = store.lookup("x");
        store.lookup("self");
        let before = store.len();
        for _ in 0..10 {
            let value = parse(&mut store, "[#1, {=#1 =x self: #1}]").unwrap();
            assert_eq!(value.as_array().unwrap()[0], Value::Frame(x));
        }
        assert_eq!(store.len(), before);
    }

    #[test]
    fn test_missing_colon() {
        let mut store = Store::new();
        let err = parse(&mut store, "{a 1}").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedToken {
                found: "integer 1".to_string(),
                expected: "':'",
                line: 1,
                column: 4,
            }
        );
    }

    #[test]
    fn test_unexpected_eof() {
        let mut store = Store::new();
        assert_eq!(
            parse(&mut store, "{a: 1").unwrap_err(),
            ParseError::UnexpectedEof { expected: "'}'" }
        );
        assert_eq!(
            parse(&mut store, "[1, 2").unwrap_err(),
            ParseError::UnexpectedEof { expected: "']'" }
        );
        assert_eq!(
            parse(&mut store, "{a:").unwrap_err(),
            ParseError::UnexpectedEof { expected: "value" }
        );
    }

    #[test]
    fn test_unexpected_token() {
        let mut store = Store::new();
        let err = parse(&mut store, "}").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedToken { expected: "value", line: 1, column: 1, .. }
        ));
    }

    #[test]
    fn test_failed_value_rolls_back_only_itself() {
        let mut store = Store::new();
        let mut reader = TextReader::new(&mut store, "{=good} {=bad x: }");
        assert!(reader.read().unwrap().is_some());
        assert!(reader.read().is_err());
        drop(reader);
        assert!(store.find("good").is_some());
        assert_eq!(store.find("bad"), None);
        assert_eq!(store.find("x"), None);
    }

    #[test]
    fn test_depth_limit() {
        let input = "[".repeat(MAX_DEPTH + 1);
        let mut store = Store::new();
        let err = parse(&mut store, &input).unwrap_err();
        assert!(matches!(err, ParseError::DepthExceeded { max: MAX_DEPTH, .. }));
    }

    #[test]
    fn test_empty_input() {
        let mut store = Store::new();
        assert_eq!(parse(&mut store, "  ; nothing here\n").unwrap(), Value::Null);
    }
}
