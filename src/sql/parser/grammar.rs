//! Grammar arena
//!
//! A dialect's grammar is a graph of [`Node`]s stored in one [`Grammar`] and
//! addressed by [`NodeId`]. The builder methods append nodes and return their
//! ids; named rules are attached with [`Grammar::define`] and referenced with
//! [`Grammar::ref_`], which is how rules refer to each other recursively and
//! in any order. [`Grammar::compile`] freezes the arena: it resolves every
//! reference and bracket pair, reports construction mistakes as
//! [`CompileError`]s and precomputes the first-token sets used to prune
//! alternatives.
//!
//! Plain string matchers and option-less references are interned, so the
//! same keyword or rule name always yields the same id. Terminator and
//! delimiter comparisons rely on that.

use crate::sql::errors::CompileError;
use crate::sql::parser::context::IndentToggle;
use crate::sql::segments::{SyntaxKind, SyntaxSet};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Fail unless everything up to the end of the available segments
    /// matches.
    #[default]
    Strict,
    /// Claim everything up to the next terminator, wrapping what doesn't
    /// match as unparsable.
    Greedy,
    /// Like `Greedy`, but only once the first element has matched.
    GreedyOnceStarted,
}

#[derive(Debug, Clone)]
pub struct SequenceOptions {
    pub allow_gaps: bool,
    pub parse_mode: ParseMode,
    pub terminators: Vec<NodeId>,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            allow_gaps: true,
            parse_mode: ParseMode::Strict,
            terminators: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OneOfOptions {
    pub allow_gaps: bool,
    pub parse_mode: ParseMode,
    pub terminators: Vec<NodeId>,
    pub reset_terminators: bool,
    pub exclude: Option<NodeId>,
}

impl Default for OneOfOptions {
    fn default() -> Self {
        Self {
            allow_gaps: true,
            parse_mode: ParseMode::Strict,
            terminators: Vec::new(),
            reset_terminators: false,
            exclude: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnyNumberOfOptions {
    pub min_times: usize,
    pub max_times: Option<usize>,
    pub max_times_per_element: Option<usize>,
    pub allow_gaps: bool,
    pub parse_mode: ParseMode,
    pub terminators: Vec<NodeId>,
    pub reset_terminators: bool,
    pub exclude: Option<NodeId>,
}

impl Default for AnyNumberOfOptions {
    fn default() -> Self {
        Self {
            min_times: 0,
            max_times: None,
            max_times_per_element: None,
            allow_gaps: true,
            parse_mode: ParseMode::Strict,
            terminators: Vec::new(),
            reset_terminators: false,
            exclude: None,
        }
    }
}

impl From<OneOfOptions> for AnyNumberOfOptions {
    fn from(options: OneOfOptions) -> Self {
        Self {
            min_times: 1,
            max_times: Some(1),
            max_times_per_element: None,
            allow_gaps: options.allow_gaps,
            parse_mode: options.parse_mode,
            terminators: options.terminators,
            reset_terminators: options.reset_terminators,
            exclude: options.exclude,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DelimitedOptions {
    pub allow_trailing: bool,
    pub min_delimiters: usize,
    pub allow_gaps: bool,
    pub optional_delimiter: bool,
    pub terminators: Vec<NodeId>,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            allow_trailing: false,
            min_delimiters: 0,
            allow_gaps: true,
            optional_delimiter: false,
            terminators: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BracketedOptions {
    pub bracket_type: String,
    pub bracket_pairs_set: String,
    pub allow_gaps: bool,
    pub parse_mode: ParseMode,
}

impl Default for BracketedOptions {
    fn default() -> Self {
        Self {
            bracket_type: "round".to_string(),
            bracket_pairs_set: "bracket_pairs".to_string(),
            allow_gaps: true,
            parse_mode: ParseMode::Strict,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartsWithOptions {
    pub terminators: Vec<NodeId>,
    pub include_terminator: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RefOptions {
    pub exclude: Option<NodeId>,
    pub terminators: Vec<NodeId>,
    pub reset_terminators: bool,
}

/// One bracket pair of a bracket set, by rule name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketPair {
    pub bracket_type: String,
    pub start: String,
    pub end: String,
    /// Whether the pair becomes a `bracketed` node when found during a
    /// greedy search.
    pub persists: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBracket {
    pub start: NodeId,
    pub end: NodeId,
    pub persists: bool,
}

/// Raw strings and segment types a matcher can start with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleSet {
    pub raws: FxHashSet<String>,
    pub types: SyntaxSet,
}

impl SimpleSet {
    fn extend(&mut self, other: &SimpleSet) {
        self.raws.extend(other.raws.iter().cloned());
        self.types = self.types.union(other.types);
    }

    pub fn admits(&self, first_raw: &str, first_types: &SyntaxSet) -> bool {
        self.raws.contains(first_raw) || self.types.intersects(first_types)
    }
}

#[derive(Debug, Clone)]
pub struct RegexMatcher {
    pub pattern: String,
    pub regex: Regex,
    pub anti_regex: Option<Regex>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    String {
        template: String,
        kind: SyntaxKind,
    },
    MultiString {
        templates: Vec<String>,
        kind: SyntaxKind,
    },
    Regex {
        matcher: Box<RegexMatcher>,
        kind: SyntaxKind,
    },
    Typed {
        template: SyntaxKind,
        kind: SyntaxKind,
    },
    Code,
    NonCode,
    Nothing,
    Meta(SyntaxKind),
    Conditional {
        meta: SyntaxKind,
        toggle: IndentToggle,
        enabled: bool,
    },
    NodeMatcher {
        kind: SyntaxKind,
        child: NodeId,
    },
    Sequence {
        children: Vec<NodeId>,
        options: SequenceOptions,
    },
    OneOf {
        children: Vec<NodeId>,
        options: OneOfOptions,
    },
    AnyNumberOf {
        children: Vec<NodeId>,
        options: AnyNumberOfOptions,
    },
    Delimited {
        elements: Vec<NodeId>,
        delimiter: NodeId,
        options: DelimitedOptions,
    },
    Bracketed {
        content: NodeId,
        options: BracketedOptions,
        resolved: Option<ResolvedBracket>,
    },
    Anything {
        terminators: Vec<NodeId>,
    },
    StartsWith {
        target: NodeId,
        options: StartsWithOptions,
    },
    Ref {
        name: String,
        options: RefOptions,
        resolved: Option<NodeId>,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InternKey {
    String(String, SyntaxKind),
    Ref(String),
}

#[derive(Debug, Clone, Default)]
pub struct Grammar {
    nodes: Vec<Node>,
    definitions: FxHashMap<String, NodeId>,
    bracket_sets: FxHashMap<String, Vec<BracketPair>>,
    resolved_brackets: FxHashMap<String, Vec<ResolvedBracket>>,
    interned: FxHashMap<InternKey, NodeId>,
    simple: Vec<Option<Rc<SimpleSet>>>,
    errors: Vec<CompileError>,
    compiled: bool,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            optional: false,
        });
        id
    }

    fn invalid(&mut self, element: &str, reason: impl Into<String>) {
        self.errors.push(CompileError::InvalidGrammar {
            element: element.to_string(),
            reason: reason.into(),
        });
    }

    pub fn keyword(&mut self, keyword: &str) -> NodeId {
        self.string(keyword, SyntaxKind::Keyword)
    }

    /// Case-insensitive match of a single code segment, retyped as `kind`.
    pub fn string(&mut self, template: &str, kind: SyntaxKind) -> NodeId {
        let template = template.to_uppercase();
        let key = InternKey::String(template.clone(), kind);
        if let Some(id) = self.interned.get(&key) {
            return *id;
        }
        let id = self.push(NodeKind::String { template, kind });
        self.interned.insert(key, id);
        id
    }

    pub fn multi_string(&mut self, templates: &[&str], kind: SyntaxKind) -> NodeId {
        if templates.is_empty() {
            self.invalid("MultiString", "needs at least one template");
        }
        let templates = templates.iter().map(|t| t.to_uppercase()).collect();
        self.push(NodeKind::MultiString { templates, kind })
    }

    /// Full-match of the uppercased raw text against `pattern`, unless it
    /// also matches `anti_pattern`.
    pub fn regex(&mut self, pattern: &str, anti_pattern: Option<&str>, kind: SyntaxKind) -> NodeId {
        let anchored = |p: &str| Regex::new(&format!("^(?:{})$", p));
        let regex = match anchored(pattern) {
            Ok(regex) => regex,
            Err(err) => {
                self.invalid("Regex", format!("bad pattern {:?}: {}", pattern, err));
                return self.nothing();
            }
        };
        let anti_regex = match anti_pattern.map(anchored).transpose() {
            Ok(anti) => anti,
            Err(err) => {
                self.invalid("Regex", format!("bad anti-pattern {:?}: {}", anti_pattern, err));
                None
            }
        };
        self.push(NodeKind::Regex {
            matcher: Box::new(RegexMatcher {
                pattern: pattern.to_string(),
                regex,
                anti_regex,
            }),
            kind,
        })
    }

    pub fn typed(&mut self, template: SyntaxKind, kind: SyntaxKind) -> NodeId {
        self.push(NodeKind::Typed { template, kind })
    }

    pub fn code(&mut self) -> NodeId {
        self.push(NodeKind::Code)
    }

    pub fn non_code(&mut self) -> NodeId {
        self.push(NodeKind::NonCode)
    }

    pub fn nothing(&mut self) -> NodeId {
        self.push(NodeKind::Nothing)
    }

    pub fn meta(&mut self, kind: SyntaxKind) -> NodeId {
        if !matches!(
            kind,
            SyntaxKind::Indent | SyntaxKind::ImplicitIndent | SyntaxKind::Dedent
        ) {
            self.invalid("Meta", format!("{} is not an indent meta", kind));
        }
        self.push(NodeKind::Meta(kind))
    }

    pub fn indent(&mut self) -> NodeId {
        self.meta(SyntaxKind::Indent)
    }

    pub fn implicit_indent(&mut self) -> NodeId {
        self.meta(SyntaxKind::ImplicitIndent)
    }

    pub fn dedent(&mut self) -> NodeId {
        self.meta(SyntaxKind::Dedent)
    }

    /// A meta that is only inserted when `toggle` is set to `enabled`.
    pub fn conditional(&mut self, meta: SyntaxKind, toggle: IndentToggle, enabled: bool) -> NodeId {
        if meta.indent_val() == 0 {
            self.invalid("Conditional", format!("{} is not an indent meta", meta));
        }
        self.push(NodeKind::Conditional {
            meta,
            toggle,
            enabled,
        })
    }

    /// Wrap whatever `child` matches in a composite of `kind`.
    pub fn node_matcher(&mut self, kind: SyntaxKind, child: NodeId) -> NodeId {
        self.push(NodeKind::NodeMatcher { kind, child })
    }

    pub fn sequence(&mut self, children: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.sequence_with(children, SequenceOptions::default())
    }

    pub fn sequence_with(
        &mut self,
        children: impl IntoIterator<Item = NodeId>,
        options: SequenceOptions,
    ) -> NodeId {
        let children: Vec<NodeId> = children.into_iter().collect();
        if options.parse_mode != ParseMode::Strict && options.terminators.is_empty() {
            log::debug!(
                target: "sqlreflow::parser",
                "greedy sequence without own terminators relies on the caller's"
            );
        }
        self.push(NodeKind::Sequence { children, options })
    }

    pub fn one_of(&mut self, children: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.one_of_with(children, OneOfOptions::default())
    }

    pub fn one_of_with(
        &mut self,
        children: impl IntoIterator<Item = NodeId>,
        options: OneOfOptions,
    ) -> NodeId {
        let children: Vec<NodeId> = children.into_iter().collect();
        if children.is_empty() {
            self.invalid("OneOf", "needs at least one alternative");
        }
        self.push(NodeKind::OneOf { children, options })
    }

    pub fn any_number_of(&mut self, children: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.any_number_of_with(children, AnyNumberOfOptions::default())
    }

    pub fn any_number_of_with(
        &mut self,
        children: impl IntoIterator<Item = NodeId>,
        options: AnyNumberOfOptions,
    ) -> NodeId {
        let children: Vec<NodeId> = children.into_iter().collect();
        if children.is_empty() {
            self.invalid("AnyNumberOf", "needs at least one element");
        }
        if let Some(max) = options.max_times {
            if max < options.min_times {
                self.invalid(
                    "AnyNumberOf",
                    format!("max_times {} is below min_times {}", max, options.min_times),
                );
            }
        }
        self.push(NodeKind::AnyNumberOf { children, options })
    }

    /// Any of `children` in any order, each at most once.
    pub fn any_set_of(
        &mut self,
        children: impl IntoIterator<Item = NodeId>,
        options: AnyNumberOfOptions,
    ) -> NodeId {
        self.any_number_of_with(
            children,
            AnyNumberOfOptions {
                max_times_per_element: Some(1),
                ..options
            },
        )
    }

    pub fn delimited(
        &mut self,
        elements: impl IntoIterator<Item = NodeId>,
        delimiter: NodeId,
    ) -> NodeId {
        self.delimited_with(elements, delimiter, DelimitedOptions::default())
    }

    pub fn delimited_with(
        &mut self,
        elements: impl IntoIterator<Item = NodeId>,
        delimiter: NodeId,
        options: DelimitedOptions,
    ) -> NodeId {
        let elements: Vec<NodeId> = elements.into_iter().collect();
        if elements.is_empty() {
            self.invalid("Delimited", "needs at least one element");
        }
        self.push(NodeKind::Delimited {
            elements,
            delimiter,
            options,
        })
    }

    pub fn bracketed(&mut self, content: NodeId) -> NodeId {
        self.bracketed_with(content, BracketedOptions::default())
    }

    pub fn bracketed_with(&mut self, content: NodeId, options: BracketedOptions) -> NodeId {
        self.push(NodeKind::Bracketed {
            content,
            options,
            resolved: None,
        })
    }

    /// `content`, either bare or in round brackets.
    pub fn optionally_bracketed(&mut self, content: NodeId) -> NodeId {
        let bracketed = self.bracketed(content);
        self.one_of([bracketed, content])
    }

    /// Everything up to the caller's terminators.
    pub fn anything(&mut self) -> NodeId {
        self.anything_until(Vec::new())
    }

    pub fn anything_until(&mut self, terminators: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Anything { terminators })
    }

    /// `target`, then everything up to the first of `options.terminators`.
    pub fn starts_with(&mut self, target: NodeId, options: StartsWithOptions) -> NodeId {
        if options.terminators.is_empty() {
            self.invalid("StartsWith", "needs at least one terminator");
        }
        self.push(NodeKind::StartsWith { target, options })
    }

    pub fn ref_(&mut self, name: &str) -> NodeId {
        let key = InternKey::Ref(name.to_string());
        if let Some(id) = self.interned.get(&key) {
            return *id;
        }
        let id = self.ref_with(name, RefOptions::default());
        self.interned.insert(key, id);
        id
    }

    pub fn ref_with(&mut self, name: &str, options: RefOptions) -> NodeId {
        self.push(NodeKind::Ref {
            name: name.to_string(),
            options,
            resolved: None,
        })
    }

    /// A copy of `id` that may be skipped by an enclosing sequence.
    pub fn optional(&mut self, id: NodeId) -> NodeId {
        let mut node = self.nodes[id.index()].clone();
        node.optional = true;
        let copy = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        copy
    }

    pub fn define(&mut self, name: &str, id: NodeId) {
        if self.definitions.insert(name.to_string(), id).is_some() {
            self.errors.push(CompileError::DuplicateDefinition {
                name: name.to_string(),
            });
        }
    }

    pub fn bracket_pair(
        &mut self,
        set: &str,
        bracket_type: &str,
        start: &str,
        end: &str,
        persists: bool,
    ) {
        self.bracket_sets
            .entry(set.to_string())
            .or_default()
            .push(BracketPair {
                bracket_type: bracket_type.to_string(),
                start: start.to_string(),
                end: end.to_string(),
                persists,
            });
    }

    /// Freeze the grammar.
    pub fn compile(mut self) -> Result<Self, CompileError> {
        if let Some(err) = self.errors.first() {
            return Err(err.clone());
        }

        for (set, pairs) in &self.bracket_sets {
            let mut resolved = Vec::with_capacity(pairs.len());
            for pair in pairs {
                let lookup = |name: &str| {
                    self.definitions
                        .get(name)
                        .copied()
                        .ok_or_else(|| CompileError::MissingReference {
                            name: name.to_string(),
                        })
                };
                resolved.push(ResolvedBracket {
                    start: lookup(&pair.start)?,
                    end: lookup(&pair.end)?,
                    persists: pair.persists,
                });
            }
            self.resolved_brackets.insert(set.clone(), resolved);
        }

        for idx in 0..self.nodes.len() {
            match &self.nodes[idx].kind {
                NodeKind::Ref { name, .. } => {
                    let target = self.definitions.get(name).copied().ok_or_else(|| {
                        CompileError::MissingReference { name: name.clone() }
                    })?;
                    if let NodeKind::Ref { resolved, .. } = &mut self.nodes[idx].kind {
                        *resolved = Some(target);
                    }
                }
                NodeKind::Bracketed { options, .. } => {
                    let found =
                        self.find_bracket(&options.bracket_pairs_set, &options.bracket_type)?;
                    if let NodeKind::Bracketed { resolved, .. } = &mut self.nodes[idx].kind {
                        *resolved = Some(found);
                    }
                }
                _ => {}
            }
        }

        self.compute_simple_sets();
        self.compiled = true;
        log::debug!(
            target: "sqlreflow::parser",
            "compiled grammar: {} nodes, {} definitions",
            self.nodes.len(),
            self.definitions.len()
        );
        Ok(self)
    }

    fn find_bracket(&self, set: &str, bracket_type: &str) -> Result<ResolvedBracket, CompileError> {
        let unknown = || CompileError::UnknownBracket {
            bracket_type: bracket_type.to_string(),
            set: set.to_string(),
        };
        let pairs = self.bracket_sets.get(set).ok_or_else(unknown)?;
        let position = pairs
            .iter()
            .position(|pair| pair.bracket_type == bracket_type)
            .ok_or_else(unknown)?;
        self.resolved_brackets
            .get(set)
            .and_then(|resolved| resolved.get(position))
            .copied()
            .ok_or_else(unknown)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn root(&self, name: &str) -> Option<NodeId> {
        self.definitions.get(name).copied()
    }

    pub fn bracket_set(&self, set: &str) -> &[ResolvedBracket] {
        self.resolved_brackets
            .get(set)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn simple(&self, id: NodeId) -> Option<&SimpleSet> {
        self.simple.get(id.index()).and_then(|s| s.as_deref())
    }

    pub fn is_optional(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.optional
            || matches!(&node.kind, NodeKind::AnyNumberOf { options, .. } if options.min_times == 0)
    }

    /// Whether `id` contributes zero-width metas rather than matching text.
    pub fn is_meta(&self, id: NodeId) -> bool {
        matches!(
            self.node(id).kind,
            NodeKind::Meta(_) | NodeKind::Conditional { .. }
        )
    }

    /// Short human-readable description, used in "expected" messages.
    pub fn describe(&self, id: NodeId) -> String {
        let list = |ids: &[NodeId]| {
            ids.iter()
                .filter(|id| !self.is_meta(**id))
                .map(|id| self.describe(*id))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let description = match &self.node(id).kind {
            NodeKind::String { template, .. } => format!("'{}'", template),
            NodeKind::MultiString { templates, .. } => {
                format!("one of '{}'", templates.join("', '"))
            }
            NodeKind::Regex { kind, .. } | NodeKind::Typed { kind, .. } => kind.to_string(),
            NodeKind::Code => "code".to_string(),
            NodeKind::NonCode => "non-code".to_string(),
            NodeKind::Nothing => "nothing".to_string(),
            NodeKind::Meta(kind) | NodeKind::Conditional { meta: kind, .. } => kind.to_string(),
            NodeKind::NodeMatcher { kind, .. } => kind.to_string(),
            NodeKind::Sequence { children, .. } => {
                let first = children.iter().find(|id| !self.is_meta(**id));
                match first {
                    Some(first) => self.describe(*first),
                    None => "nothing".to_string(),
                }
            }
            NodeKind::OneOf { children, .. } => format!("one of ({})", list(children)),
            NodeKind::AnyNumberOf { children, .. } => format!("any of ({})", list(children)),
            NodeKind::Delimited { elements, .. } => format!("list of ({})", list(elements)),
            NodeKind::Bracketed { content, .. } => format!("bracketed {}", self.describe(*content)),
            NodeKind::Anything { .. } => "anything".to_string(),
            NodeKind::StartsWith { target, .. } => self.describe(*target),
            NodeKind::Ref { name, .. } => name.clone(),
        };
        if description.len() > 80 {
            let cut = (0..=77).rev().find(|i| description.is_char_boundary(*i)).unwrap_or(0);
            format!("{}...", &description[..cut])
        } else {
            description
        }
    }

    fn compute_simple_sets(&mut self) {
        let mut memo: Vec<SimpleState> = vec![SimpleState::Pending; self.nodes.len()];
        for idx in 0..self.nodes.len() {
            self.simple_of(NodeId(idx as u32), &mut memo);
        }
        self.simple = memo
            .into_iter()
            .map(|state| match state {
                SimpleState::Done(set) => set,
                _ => None,
            })
            .collect();
    }

    fn simple_of(&self, id: NodeId, memo: &mut Vec<SimpleState>) -> Option<Rc<SimpleSet>> {
        match &memo[id.index()] {
            SimpleState::Done(set) => return set.clone(),
            SimpleState::InProgress => {
                log::debug!(
                    target: "sqlreflow::parser",
                    "recursive grammar at {}: no first-token set",
                    self.describe(id)
                );
                return None;
            }
            SimpleState::Pending => {}
        }
        memo[id.index()] = SimpleState::InProgress;

        let union = |ids: &[NodeId], memo: &mut Vec<SimpleState>| -> Option<Rc<SimpleSet>> {
            let mut set = SimpleSet::default();
            for child in ids {
                let child_set = self.simple_of(*child, memo)?;
                set.extend(&*child_set);
            }
            Some(Rc::new(set))
        };

        let result = match &self.node(id).kind {
            NodeKind::String { template, .. } => {
                let mut set = SimpleSet::default();
                set.raws.insert(template.clone());
                Some(Rc::new(set))
            }
            NodeKind::MultiString { templates, .. } => Some(Rc::new(SimpleSet {
                raws: templates.iter().cloned().collect(),
                types: SyntaxSet::EMPTY,
            })),
            NodeKind::Typed { template, .. } => Some(Rc::new(SimpleSet {
                raws: FxHashSet::default(),
                types: SyntaxSet::single(*template),
            })),
            NodeKind::Nothing => Some(Rc::new(SimpleSet::default())),
            NodeKind::NodeMatcher { kind, child } => self.simple_of(*child, memo).map(|inner| {
                let mut set = (*inner).clone();
                set.types.insert(*kind);
                Rc::new(set)
            }),
            NodeKind::Sequence { children, .. } => {
                let mut set = SimpleSet::default();
                let mut complete = true;
                for child in children.iter().filter(|c| !self.is_meta(**c)) {
                    match self.simple_of(*child, memo) {
                        Some(inner) => set.extend(&*inner),
                        None => {
                            complete = false;
                            break;
                        }
                    }
                    if !self.is_optional(*child) {
                        break;
                    }
                }
                complete.then(|| Rc::new(set))
            }
            NodeKind::OneOf { children, .. } | NodeKind::AnyNumberOf { children, .. } => {
                union(children, memo)
            }
            NodeKind::Delimited { elements, .. } => union(elements, memo),
            NodeKind::Bracketed { resolved, .. } => {
                resolved.and_then(|bracket| self.simple_of(bracket.start, memo))
            }
            NodeKind::StartsWith { target, .. } => self.simple_of(*target, memo),
            NodeKind::Ref { resolved, .. } => {
                resolved.and_then(|target| self.simple_of(target, memo))
            }
            NodeKind::Regex { .. }
            | NodeKind::Code
            | NodeKind::NonCode
            | NodeKind::Meta(_)
            | NodeKind::Conditional { .. }
            | NodeKind::Anything { .. } => None,
        };

        memo[id.index()] = SimpleState::Done(result.clone());
        result
    }
}

#[derive(Debug, Clone)]
enum SimpleState {
    Pending,
    InProgress,
    Done(Option<Rc<SimpleSet>>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_compile_resolves_refs() {
        let mut g = Grammar::new();
        let plus = g.ref_("PlusSegment");
        let minus = g.ref_("MinusSegment");
        let arith = g.one_of([plus, minus]);
        g.define("ArithmeticGrammar", arith);
        let plus_sym = g.string("+", SyntaxKind::BinaryOperator);
        let minus_sym = g.string("-", SyntaxKind::BinaryOperator);
        g.define("PlusSegment", plus_sym);
        g.define("MinusSegment", minus_sym);

        let g = g.compile().unwrap();
        assert_eq!(g.root("ArithmeticGrammar"), Some(arith));
        let simple = g.simple(arith).unwrap();
        assert!(simple.raws.contains("+"));
        assert!(simple.raws.contains("-"));
    }

    #[test]
    fn test_missing_reference() {
        let mut g = Grammar::new();
        let r = g.ref_("Nowhere");
        g.define("Root", r);
        assert_eq!(
            g.compile().unwrap_err(),
            CompileError::MissingReference {
                name: "Nowhere".into()
            }
        );
    }

    #[test]
    fn test_construction_errors_surface_at_compile() {
        let mut g = Grammar::new();
        let kw = g.keyword("select");
        g.starts_with(kw, StartsWithOptions::default());
        assert!(matches!(
            g.compile(),
            Err(CompileError::InvalidGrammar { element, .. }) if element == "StartsWith"
        ));

        let mut g = Grammar::new();
        let kw = g.keyword("select");
        g.bracketed_with(
            kw,
            BracketedOptions {
                bracket_type: "curly".into(),
                ..BracketedOptions::default()
            },
        );
        assert!(matches!(g.compile(), Err(CompileError::UnknownBracket { .. })));

        let mut g = Grammar::new();
        let kw = g.keyword("select");
        g.any_number_of_with(
            [kw],
            AnyNumberOfOptions {
                min_times: 2,
                max_times: Some(1),
                ..AnyNumberOfOptions::default()
            },
        );
        assert!(g.compile().is_err());
    }

    #[test]
    fn test_interning() {
        let mut g = Grammar::new();
        assert_eq!(g.keyword("from"), g.keyword("FROM"));
        assert_ne!(
            g.string(",", SyntaxKind::Comma),
            g.string(",", SyntaxKind::Symbol)
        );
        assert_eq!(g.ref_("A"), g.ref_("A"));
        let a = g.ref_("A");
        assert_ne!(g.optional(a), a);
    }

    #[test]
    fn test_sequence_simple_skips_optional_and_metas() {
        let mut g = Grammar::new();
        let indent = g.indent();
        let distinct = g.keyword("distinct");
        let distinct = g.optional(distinct);
        let all = g.keyword("all");
        let tail = g.keyword("tail");
        let seq = g.sequence([indent, distinct, all, tail]);
        let g = g.compile().unwrap();
        let simple = g.simple(seq).unwrap();
        let mut raws: Vec<_> = simple.raws.iter().cloned().collect();
        raws.sort();
        assert_eq!(raws, vec!["ALL", "DISTINCT"]);
    }

    #[test]
    fn test_one_of_and_delimited_simple_is_union() {
        let mut g = Grammar::new();
        let select = g.keyword("select");
        let number = g.typed(SyntaxKind::NumericLiteral, SyntaxKind::NumericLiteral);
        let one = g.one_of([select, number]);
        let comma = g.string(",", SyntaxKind::Comma);
        let list = g.delimited([one], comma);
        let regex = g.regex("[A-Z]+", None, SyntaxKind::NakedIdentifier);
        let open_ended = g.one_of([select, regex]);
        let g = g.compile().unwrap();

        for id in [one, list] {
            let simple = g.simple(id).unwrap();
            assert!(simple.raws.contains("SELECT"));
            assert!(simple.types.contains(SyntaxKind::NumericLiteral));
        }
        assert!(g.simple(open_ended).is_none());
    }

    #[test]
    fn test_recursive_refs_are_not_simple() {
        let mut g = Grammar::new();
        let expr = g.ref_("Expr");
        let open = g.string("(", SyntaxKind::StartBracket);
        let close = g.string(")", SyntaxKind::EndBracket);
        g.define("StartBracketSegment", open);
        g.define("EndBracketSegment", close);
        g.bracket_pair("bracket_pairs", "round", "StartBracketSegment", "EndBracketSegment", true);
        let bracketed = g.bracketed(expr);
        let regex = g.regex("[A-Z]+", None, SyntaxKind::NakedIdentifier);
        let cyclic = g.sequence([expr, regex]);
        let body = g.one_of([bracketed, regex, cyclic]);
        g.define("Expr", body);
        let g = g.compile().unwrap();
        assert!(g.simple(body).is_none());
        assert!(g.simple(bracketed).unwrap().raws.contains("("));
    }

    #[test]
    fn test_describe() {
        let mut g = Grammar::new();
        let select = g.keyword("select");
        let from = g.keyword("from");
        let one = g.one_of([select, from]);
        let r = g.ref_("SelectClauseSegment");
        assert_eq!(g.describe(select), "'SELECT'");
        assert_eq!(g.describe(one), "one of ('SELECT', 'FROM')");
        assert_eq!(g.describe(r), "SelectClauseSegment");
    }
}
