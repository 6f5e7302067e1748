//! Range-expression grammar and recognizer.
//!
//! A hand-written PEG recognizer over rune input. Each grammar rule is one
//! method returning `bool`; ordered choice commits on the first alternative
//! that matches, and backtracking restores a `(position, token index, depth)`
//! mark, nothing else. Every finished rule appends a token to the
//! [`TokenStore`], so the store ends up holding the parse in post-order,
//! interleaved with zero-width action markers and `Text` captures that the
//! AST builder later folds into an expression.
//!
//! The grammar:
//!
//! ```text
//! expression  <- space rangeexpr combinators? !.
//! rangeexpr   <- space (q / function / cluster / group / groupq
//!                      / localkey / regex / value / (AddNull braces) / null)
//! combinators <- space (union / intersect / exclude / braces) combinators?
//! union       <- ',' operand AddUnion
//! intersect   <- '&' operand AddIntersect
//! exclude     <- '-' operand AddSubtract
//! braces      <- '{' rangeexpr combinators? '}' rangeexpr AddBraces
//! cluster     <- '%' rangeexpr AddClusterLookup key?
//! key         <- ':' rangeexpr AddKeyLookup
//! group       <- '@' rangeexpr AddGroupLookup
//! groupq      <- '?' rangeexpr AddGroupQuery
//! localkey    <- '$' literal AddLocalClusterLookup
//! function    <- literal AddFunction '(' funcargs ')'
//! funcargs    <- (funcarg AddFuncArg ';' funcargs) / (funcarg AddFuncArgLast)
//! funcarg     <- rangeexpr combinators?
//! regex       <- '/' <(!'/' .)*> '/' AddRegex
//! q           <- 'q' '(' <(!')' .)*> ')' AddConst
//! literal     <- <[a-zA-Z0-9_-]+>
//! value       <- <[a-zA-Z0-9_.-]+> AddValue
//! space       <- ' '*
//! null        <- ε
//! ```
//!
//! `operand` is `rangeexpr` without the `null` fallback: the right side of a
//! binary operator must consume input, which is what turns a dangling
//! operator such as `%web&` into a parse error instead of an intersection
//! with an empty right side. `combinators` recurses at its own tail while
//! the operator rules stay flat, so `a,b,c` emits one operator action per
//! operand and the builder folds the chain left-associatively.
//!
//! On failure the recognizer reports the deepest position any rule reached,
//! translated to line/symbol coordinates over the rune buffer (the virtual
//! end-of-input sentinel counts as one symbol).

use std::fmt;

use crate::error::{RangeError, Result};
use crate::token::{ParseTree, TokenStore};

/// Virtually appended to the buffer; no grammar literal can match it.
pub const END_SYMBOL: char = '\u{4}';

/// Rules and markers a token can carry. The `Add*` variants are zero-width
/// action markers; `Text` wraps a capture; `Pre`/`In`/`Suf` only occur in the
/// pre-order enumeration of a parse tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rule {
    Unknown,
    Expression,
    Rangeexpr,
    Combinators,
    Intersect,
    Exclude,
    Union,
    Braces,
    Groupq,
    Cluster,
    Group,
    Key,
    Localkey,
    Function,
    Funcargs,
    Regex,
    Literal,
    Value,
    Space,
    Q,
    Null,
    Text,
    AddNull,
    AddIntersect,
    AddSubtract,
    AddUnion,
    AddBraces,
    AddGroupQuery,
    AddClusterLookup,
    AddGroupLookup,
    AddKeyLookup,
    AddLocalClusterLookup,
    AddFunction,
    AddFuncArg,
    AddFuncArgLast,
    AddRegex,
    AddValue,
    AddConst,
    Pre,
    In,
    Suf,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rule::Unknown => "unknown",
            Rule::Expression => "expression",
            Rule::Rangeexpr => "rangeexpr",
            Rule::Combinators => "combinators",
            Rule::Intersect => "intersect",
            Rule::Exclude => "exclude",
            Rule::Union => "union",
            Rule::Braces => "braces",
            Rule::Groupq => "groupq",
            Rule::Cluster => "cluster",
            Rule::Group => "group",
            Rule::Key => "key",
            Rule::Localkey => "localkey",
            Rule::Function => "function",
            Rule::Funcargs => "funcargs",
            Rule::Regex => "regex",
            Rule::Literal => "literal",
            Rule::Value => "value",
            Rule::Space => "space",
            Rule::Q => "q",
            Rule::Null => "null",
            Rule::Text => "text",
            Rule::AddNull => "add-null",
            Rule::AddIntersect => "add-intersect",
            Rule::AddSubtract => "add-subtract",
            Rule::AddUnion => "add-union",
            Rule::AddBraces => "add-braces",
            Rule::AddGroupQuery => "add-groupquery",
            Rule::AddClusterLookup => "add-clusterlookup",
            Rule::AddGroupLookup => "add-grouplookup",
            Rule::AddKeyLookup => "add-keylookup",
            Rule::AddLocalClusterLookup => "add-localclusterlookup",
            Rule::AddFunction => "add-function",
            Rule::AddFuncArg => "add-funcarg",
            Rule::AddFuncArgLast => "add-funcarg-last",
            Rule::AddRegex => "add-regex",
            Rule::AddValue => "add-value",
            Rule::AddConst => "add-const",
            Rule::Pre => "pre",
            Rule::In => "in",
            Rule::Suf => "suf",
        };
        f.write_str(name)
    }
}

/// Backtracking checkpoint. Restoring one is the only recognizer state change
/// a failed alternative performs; committed tokens past the restored index are
/// simply overwritten later.
#[derive(Clone, Copy)]
struct Mark {
    position: usize,
    token_index: usize,
    depth: usize,
}

/// One query string under recognition, owning the rune buffer and the token
/// store the parse leaves behind.
#[derive(Debug)]
pub struct RangeQuery {
    buffer: Vec<char>,
    position: usize,
    token_index: usize,
    depth: usize,
    furthest: usize,
    store: TokenStore,
}

impl RangeQuery {
    pub fn new(text: &str) -> Self {
        let mut buffer: Vec<char> = text.chars().collect();
        buffer.push(END_SYMBOL);
        Self {
            buffer,
            position: 0,
            token_index: 0,
            depth: 0,
            furthest: 0,
            store: TokenStore::new(),
        }
    }

    /// Match the whole input against `expression`. On success the token store
    /// is trimmed to the committed prefix; on failure the error carries the
    /// deepest position reached.
    pub fn parse(&mut self) -> Result<()> {
        self.position = 0;
        self.token_index = 0;
        self.depth = 0;
        self.furthest = 0;
        if self.expression() {
            self.store.truncate(self.token_index);
            Ok(())
        } else {
            let (line, symbol) = translate_position(&self.buffer, self.furthest);
            Err(RangeError::Parse {
                line,
                symbol,
                snippet: self.snippet(),
            })
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn buffer(&self) -> &[char] {
        &self.buffer
    }

    /// The input slice a token covered, by char offsets.
    pub fn text(&self, begin: u32, end: u32) -> String {
        self.buffer[begin as usize..end as usize].iter().collect()
    }

    pub fn parse_tree(&self) -> Option<ParseTree> {
        self.store.parse_tree()
    }

    pub fn render_tree(&self) -> Option<String> {
        Some(self.parse_tree()?.render(&self.buffer))
    }

    fn snippet(&self) -> String {
        let rest: String = self.buffer[self.furthest..]
            .iter()
            .take_while(|&&c| c != END_SYMBOL && c != '\n')
            .take(40)
            .collect();
        if rest.is_empty() {
            "end of input".to_owned()
        } else {
            format!("at {rest:?}")
        }
    }

    // --- recognizer machinery ---

    fn mark(&self) -> Mark {
        Mark {
            position: self.position,
            token_index: self.token_index,
            depth: self.depth,
        }
    }

    fn restore(&mut self, mark: Mark) {
        self.position = mark.position;
        self.token_index = mark.token_index;
        self.depth = mark.depth;
    }

    fn add(&mut self, rule: Rule, begin: usize) {
        self.store
            .write(self.token_index, rule, begin, self.position, self.depth);
        self.token_index += 1;
    }

    /// Emit a zero-width action marker at the current position.
    fn act(&mut self, rule: Rule) {
        let position = self.position;
        self.add(rule, position);
    }

    fn fail(&mut self) {
        if self.position > self.furthest {
            self.furthest = self.position;
        }
    }

    fn current(&self) -> char {
        self.buffer[self.position]
    }

    fn match_char(&mut self, c: char) -> bool {
        if self.current() == c {
            self.position += 1;
            true
        } else {
            self.fail();
            false
        }
    }

    fn at_end(&mut self) -> bool {
        if self.current() == END_SYMBOL {
            true
        } else {
            self.fail();
            false
        }
    }

    /// Try an alternative, restoring the mark when it fails.
    fn alt(&mut self, rule: fn(&mut Self) -> bool) -> bool {
        let mark = self.mark();
        if rule(self) {
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /// Optional occurrence: failure is absorbed.
    fn opt(&mut self, rule: fn(&mut Self) -> bool) {
        let mark = self.mark();
        if !rule(self) {
            self.restore(mark);
        }
    }

    /// Capture `(!stop .)*` as a `Text` token.
    fn capture_until(&mut self, stop: char) {
        let begin = self.position;
        while self.current() != stop && self.current() != END_SYMBOL {
            self.position += 1;
        }
        self.add(Rule::Text, begin);
    }

    // --- grammar rules ---

    /* expression <- space rangeexpr combinators? !. */
    fn expression(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.space() && self.rangeexpr() && {
            self.opt(Self::combinators);
            self.at_end()
        };
        self.depth -= 1;
        if ok {
            self.add(Rule::Expression, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* rangeexpr <- space (q / function / cluster / group / groupq
                          / localkey / regex / value / (AddNull braces) / null) */
    fn rangeexpr(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.space()
            && (self.alt(Self::q)
                || self.alt(Self::function)
                || self.alt(Self::cluster)
                || self.alt(Self::group)
                || self.alt(Self::groupq)
                || self.alt(Self::localkey)
                || self.alt(Self::regex)
                || self.alt(Self::value)
                || self.alt(Self::prefixless_braces)
                || self.null());
        self.depth -= 1;
        if ok {
            self.add(Rule::Rangeexpr, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /// The right operand of a binary operator: `rangeexpr` without the `null`
    /// fallback, so a dangling operator does not match an empty expression.
    fn operand(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.space()
            && (self.alt(Self::q)
                || self.alt(Self::function)
                || self.alt(Self::cluster)
                || self.alt(Self::group)
                || self.alt(Self::groupq)
                || self.alt(Self::localkey)
                || self.alt(Self::regex)
                || self.alt(Self::value)
                || self.alt(Self::prefixless_braces));
        self.depth -= 1;
        if ok {
            self.add(Rule::Rangeexpr, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /// Braces opening a rangeexpr have no preceding expression; push the
    /// missing prefix before descending.
    fn prefixless_braces(&mut self) -> bool {
        self.act(Rule::AddNull);
        self.braces()
    }

    /* combinators <- space (union / intersect / exclude / braces) combinators? */
    fn combinators(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.space()
            && (self.alt(Self::union)
                || self.alt(Self::intersect)
                || self.alt(Self::exclude)
                || self.alt(Self::braces));
        if ok {
            self.opt(Self::combinators);
        }
        self.depth -= 1;
        if ok {
            self.add(Rule::Combinators, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* union <- ',' operand AddUnion */
    fn union(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.match_char(',') && self.operand() && {
            self.act(Rule::AddUnion);
            true
        };
        self.depth -= 1;
        if ok {
            self.add(Rule::Union, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* intersect <- '&' operand AddIntersect */
    fn intersect(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.match_char('&') && self.operand() && {
            self.act(Rule::AddIntersect);
            true
        };
        self.depth -= 1;
        if ok {
            self.add(Rule::Intersect, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* exclude <- '-' operand AddSubtract */
    fn exclude(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.match_char('-') && self.operand() && {
            self.act(Rule::AddSubtract);
            true
        };
        self.depth -= 1;
        if ok {
            self.add(Rule::Exclude, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* braces <- '{' rangeexpr combinators? '}' rangeexpr AddBraces
       The trailing rangeexpr is the expansion suffix; its null fallback
       pushes the empty suffix, keeping the three-operand fold balanced. */
    fn braces(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.match_char('{')
            && self.rangeexpr()
            && {
                self.opt(Self::combinators);
                self.match_char('}')
            }
            && self.rangeexpr()
            && {
                self.act(Rule::AddBraces);
                true
            };
        self.depth -= 1;
        if ok {
            self.add(Rule::Braces, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* cluster <- '%' rangeexpr AddClusterLookup key? */
    fn cluster(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.match_char('%') && self.rangeexpr() && {
            self.act(Rule::AddClusterLookup);
            self.opt(Self::key);
            true
        };
        self.depth -= 1;
        if ok {
            self.add(Rule::Cluster, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* key <- ':' rangeexpr AddKeyLookup */
    fn key(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.match_char(':') && self.rangeexpr() && {
            self.act(Rule::AddKeyLookup);
            true
        };
        self.depth -= 1;
        if ok {
            self.add(Rule::Key, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* group <- '@' rangeexpr AddGroupLookup */
    fn group(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.match_char('@') && self.rangeexpr() && {
            self.act(Rule::AddGroupLookup);
            true
        };
        self.depth -= 1;
        if ok {
            self.add(Rule::Group, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* groupq <- '?' rangeexpr AddGroupQuery */
    fn groupq(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.match_char('?') && self.rangeexpr() && {
            self.act(Rule::AddGroupQuery);
            true
        };
        self.depth -= 1;
        if ok {
            self.add(Rule::Groupq, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* localkey <- '$' literal AddLocalClusterLookup */
    fn localkey(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.match_char('$') && self.literal() && {
            self.act(Rule::AddLocalClusterLookup);
            true
        };
        self.depth -= 1;
        if ok {
            self.add(Rule::Localkey, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* function <- literal AddFunction '(' funcargs ')' */
    fn function(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.literal()
            && {
                self.act(Rule::AddFunction);
                self.match_char('(')
            }
            && self.funcargs()
            && self.match_char(')');
        self.depth -= 1;
        if ok {
            self.add(Rule::Function, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* funcargs <- (funcarg AddFuncArg ';' funcargs) / (funcarg AddFuncArgLast) */
    fn funcargs(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let mut ok = false;
        let attempt = self.mark();
        if self.funcarg() {
            self.act(Rule::AddFuncArg);
            if self.match_char(';') && self.funcargs() {
                ok = true;
            }
        }
        if !ok {
            self.restore(attempt);
            if self.funcarg() {
                self.act(Rule::AddFuncArgLast);
                ok = true;
            }
        }
        self.depth -= 1;
        if ok {
            self.add(Rule::Funcargs, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* funcarg <- rangeexpr combinators?
       Inline; lets one argument hold a combinator chain: count(%a,%b). */
    fn funcarg(&mut self) -> bool {
        self.rangeexpr() && {
            self.opt(Self::combinators);
            true
        }
    }

    /* regex <- '/' <(!'/' .)*> '/' AddRegex */
    fn regex(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.match_char('/')
            && {
                self.capture_until('/');
                self.match_char('/')
            }
            && {
                self.act(Rule::AddRegex);
                true
            };
        self.depth -= 1;
        if ok {
            self.add(Rule::Regex, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* q <- 'q' '(' <(!')' .)*> ')' AddConst */
    fn q(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let ok = self.match_char('q')
            && self.match_char('(')
            && {
                self.capture_until(')');
                self.match_char(')')
            }
            && {
                self.act(Rule::AddConst);
                true
            };
        self.depth -= 1;
        if ok {
            self.add(Rule::Q, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    /* literal <- <[a-zA-Z0-9_-]+> */
    fn literal(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let text_begin = self.position;
        while is_literal_char(self.current()) {
            self.position += 1;
        }
        let ok = self.position > text_begin;
        if ok {
            self.add(Rule::Text, text_begin);
        }
        self.depth -= 1;
        if ok {
            self.add(Rule::Literal, begin);
            true
        } else {
            self.fail();
            self.restore(mark);
            false
        }
    }

    /* value <- <[a-zA-Z0-9_.-]+> AddValue */
    fn value(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.depth += 1;
        let text_begin = self.position;
        while is_value_char(self.current()) {
            self.position += 1;
        }
        let ok = self.position > text_begin;
        if ok {
            self.add(Rule::Text, text_begin);
            self.act(Rule::AddValue);
        }
        self.depth -= 1;
        if ok {
            self.add(Rule::Value, begin);
            true
        } else {
            self.fail();
            self.restore(mark);
            false
        }
    }

    /* space <- ' '* */
    fn space(&mut self) -> bool {
        let begin = self.position;
        while self.current() == ' ' {
            self.position += 1;
        }
        self.add(Rule::Space, begin);
        true
    }

    /* null <- ε */
    fn null(&mut self) -> bool {
        let begin = self.position;
        self.add(Rule::Null, begin);
        true
    }
}

fn is_literal_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn is_value_char(c: char) -> bool {
    is_literal_char(c) || c == '.'
}

/// Translate a char offset into one-based line and symbol coordinates. The
/// sentinel at the end of the buffer counts as a symbol, so an error at
/// end-of-input points one past the last visible character.
pub(crate) fn translate_position(buffer: &[char], offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut symbol = 0;
    for (i, &c) in buffer.iter().enumerate() {
        if c == '\n' {
            line += 1;
            symbol = 0;
        } else {
            symbol += 1;
        }
        if i == offset {
            break;
        }
    }
    (line, symbol)
}
