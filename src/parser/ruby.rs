//! Structural parser for recipes, providers and attribute files.
//!
//! Works in three steps over the token stream:
//!
//! 1. **Statements**: tokens are split at newlines and `;` outside brackets.
//!    A line ending in an operator or comma, or followed by a line starting
//!    with `.`, continues the statement.
//! 2. **Structure**: statements are fed through a frame stack. Block openers
//!    (`if`, `case`, `... do |x|`, `def`, ...) push a frame and `end` pops
//!    one, so nesting depth never touches the call stack. Each frame decides
//!    what its statements mean: top-level statements become facts and
//!    execution items, statements inside a resource block become its
//!    properties, and nested blocks inside a resource are captured raw.
//! 3. **Loops**: a separate scan over the same statements records every
//!    `<collection>.each do |vars|` with the line of its closing `end`.
//!
//! Modifier `if`/`unless` on a resource line becomes a `guard` property;
//! on an `include_recipe` line it wraps the include in a conditional.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::ParseOptions;
use super::facts::{
    AttributeAssignment, ConditionalBlock, ConditionalKind, ExecutionItem, LoopConstruct,
    ParsedFile, ParsedFileFact, Precedence, RecipeReference, ReferenceKind, ResourceInvocation,
};
use super::lexer::{Token, TokenKind, tokenize};
use super::literal;

/// Resource types shipped with the configuration-management client.
pub const BUILTIN_RESOURCES: &[&str] = &[
    "alternatives",
    "apt_package",
    "apt_repository",
    "apt_update",
    "bash",
    "batch",
    "bff_package",
    "breakpoint",
    "chef_gem",
    "chef_handler",
    "chocolatey_package",
    "cookbook_file",
    "cron",
    "cron_d",
    "csh",
    "directory",
    "dnf_package",
    "dpkg_package",
    "execute",
    "file",
    "freebsd_package",
    "gem_package",
    "git",
    "group",
    "homebrew_package",
    "hostname",
    "http_request",
    "ifconfig",
    "kernel_module",
    "link",
    "locale",
    "log",
    "mount",
    "notify_group",
    "ohai",
    "openssl_x509_certificate",
    "package",
    "perl",
    "powershell_script",
    "python",
    "reboot",
    "registry_key",
    "remote_directory",
    "remote_file",
    "route",
    "rpm_package",
    "ruby",
    "ruby_block",
    "script",
    "selinux_boolean",
    "service",
    "snap_package",
    "ssh_known_hosts_entry",
    "subversion",
    "sudo",
    "swap_file",
    "sysctl",
    "systemd_unit",
    "template",
    "timezone",
    "user",
    "windows_package",
    "windows_service",
    "yum_package",
    "yum_repository",
    "zypper_package",
];

/// Underscored DSL methods that are not resource calls.
const DSL_HELPERS: &[&str] = &[
    "action_class",
    "allowed_actions",
    "attribute",
    "chef_version",
    "chef_version_for_provides",
    "converge_by",
    "converge_if_changed",
    "current_resource",
    "data_bag",
    "data_bag_item",
    "declare_resource",
    "default_action",
    "delete_resource",
    "edit_resource",
    "encrypted_data_bag_item",
    "find_resource",
    "include_recipe",
    "issues_url",
    "load_current_value",
    "long_description",
    "new_resource",
    "ohai_version",
    "require_relative",
    "resource_name",
    "run_context",
    "set_or_return",
    "shell_out",
    "source_url",
    "unified_mode",
    "use_inline_resources",
    "value_for_platform",
    "value_for_platform_family",
    "with_run_context",
];

/// Resource block properties captured by name.
const RECOGNIZED_PROPERTIES: &[&str] = &[
    "action",
    "backup",
    "code",
    "command",
    "content",
    "cookbook",
    "creates",
    "cwd",
    "environment",
    "group",
    "home",
    "ignore_failure",
    "manage_home",
    "mode",
    "not_if",
    "notifies",
    "only_if",
    "options",
    "owner",
    "package_name",
    "path",
    "recursive",
    "retries",
    "sensitive",
    "shell",
    "source",
    "subscribes",
    "supports",
    "user",
    "variables",
    "version",
];

const KEYWORDS: &[&str] = &[
    "and", "begin", "break", "case", "class", "def", "do", "else", "elsif", "end", "ensure",
    "false", "for", "if", "in", "module", "next", "nil", "not", "or", "redo", "rescue", "retry",
    "return", "self", "super", "then", "true", "undef", "unless", "until", "when", "while",
    "yield",
];

/// Parse primary-DSL `source` read from `file`.
#[must_use]
pub fn parse(source: &str, file: &Path, options: &ParseOptions) -> ParsedFile {
    let tokens = tokenize(source);
    let statements = split_statements(&tokens);

    let mut parser = StructuralParser::new(source, &tokens, file, options);
    parser.run(&statements);
    let (mut facts, execution) = parser.finish();

    facts.extend(
        scan_loops(source, &tokens, &statements, file).into_iter().map(ParsedFileFact::LoopConstruct),
    );
    facts.sort_by_key(ParsedFileFact::line);

    tracing::trace!(
        target: "parser",
        "{}: {} facts, {} top-level items",
        file.display(),
        facts.len(),
        execution.len()
    );

    ParsedFile {
        facts,
        execution,
        keys: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Split the token stream into statement spans.
fn split_statements(tokens: &[Token]) -> Vec<Range<usize>> {
    let mut statements = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                depth = depth.saturating_sub(1);
            }
            TokenKind::Newline if depth == 0 => {
                if i > start && continues(tokens, start, i) {
                    continue;
                }
                if i > start {
                    statements.push(start..i);
                }
                start = i + 1;
            }
            TokenKind::Semicolon if depth == 0 => {
                if i > start {
                    statements.push(start..i);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if let Some(last) = tokens[start.min(tokens.len())..]
        .iter()
        .rposition(|t| t.kind != TokenKind::Newline)
    {
        statements.push(start..start + last + 1);
    }
    statements
}

/// Whether the statement `start..newline` carries on past the newline.
fn continues(tokens: &[Token], start: usize, newline: usize) -> bool {
    let Some(last) = tokens[start..newline].last() else {
        return false;
    };
    let dangling = match &last.kind {
        TokenKind::Comma
        | TokenKind::Dot
        | TokenKind::SafeNav
        | TokenKind::DoubleColon
        | TokenKind::FatArrow
        | TokenKind::Assign
        | TokenKind::OpAssign(_)
        | TokenKind::Op(_) => true,
        TokenKind::Ident(word) => matches!(word.as_str(), "and" | "or" | "not"),
        _ => false,
    };
    if dangling {
        return true;
    }
    tokens[newline..]
        .iter()
        .find(|t| t.kind != TokenKind::Newline)
        .is_some_and(|t| matches!(t.kind, TokenKind::Dot | TokenKind::SafeNav))
}

fn is_member_access(toks: &[Token], i: usize) -> bool {
    i > 0
        && matches!(
            toks[i - 1].kind,
            TokenKind::Dot | TokenKind::SafeNav | TokenKind::DoubleColon
        )
}

/// Token positions after which a keyword opens a block rather than acting
/// as a modifier.
fn opener_position(toks: &[Token], i: usize) -> bool {
    i == 0
        || matches!(
            toks[i - 1].kind,
            TokenKind::Assign
                | TokenKind::OpAssign(_)
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Comma
                | TokenKind::FatArrow
        )
}

/// Net number of blocks the statement leaves open.
fn block_balance(toks: &[Token]) -> i32 {
    let mut skip_do = toks
        .first()
        .and_then(Token::ident)
        .is_some_and(|w| matches!(w, "while" | "until" | "for"));
    let mut balance = 0i32;

    for (i, token) in toks.iter().enumerate() {
        if is_member_access(toks, i) {
            continue;
        }
        let Some(word) = token.ident() else {
            continue;
        };
        match word {
            "end" => balance -= 1,
            "do" if skip_do => skip_do = false,
            "do" => balance += 1,
            "if" | "unless" | "while" | "until" | "case" | "begin" if opener_position(toks, i) => {
                balance += 1;
            }
            "for" | "class" | "module" if i == 0 => balance += 1,
            "def" if i == 0 && !is_endless_def(toks) => balance += 1,
            _ => {}
        }
    }
    balance
}

/// `def name(args) = expr`
fn is_endless_def(toks: &[Token]) -> bool {
    let mut depth = 0usize;
    for (i, token) in toks.iter().enumerate().skip(1) {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            // `def name=(v)` is a setter, not an endless def
            TokenKind::Assign if depth == 0 => return token.start > toks[i - 1].end,
            _ => {}
        }
    }
    false
}

/// Trailing `do` / `do |params|` at bracket depth zero.
fn block_do(toks: &[Token]) -> Option<(usize, Vec<String>)> {
    let mut depth = 0usize;
    let mut do_index = None;
    for (i, token) in toks.iter().enumerate() {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                depth = depth.saturating_sub(1);
            }
            _ if depth == 0 && token.is_ident("do") && !is_member_access(toks, i) => {
                do_index = Some(i);
            }
            _ => {}
        }
    }

    let index = do_index?;
    let rest = &toks[index + 1..];
    let params = match rest {
        [] => Vec::new(),
        [first, .., last]
            if first.kind == TokenKind::Pipe && last.kind == TokenKind::Pipe =>
        {
            rest[1..rest.len() - 1].iter().filter_map(|t| t.ident().map(str::to_string)).collect()
        }
        _ => return None,
    };
    Some((index, params))
}

/// First index of a modifier keyword at depth zero.
fn modifier_index(toks: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in toks.iter().enumerate() {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                depth = depth.saturating_sub(1);
            }
            _ if depth == 0
                && i > 0
                && !opener_position(toks, i)
                && !is_member_access(toks, i)
                && token
                    .ident()
                    .is_some_and(|w| matches!(w, "if" | "unless" | "while" | "until" | "rescue")) =>
            {
                return Some(i);
            }
            _ => {}
        }
    }
    None
}

/// Split at depth-zero commas.
fn split_args(toks: &[Token]) -> Vec<&[Token]> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, token) in toks.iter().enumerate() {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                depth = depth.saturating_sub(1);
            }
            TokenKind::Comma if depth == 0 => {
                args.push(&toks[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < toks.len() {
        args.push(&toks[start..]);
    }
    args.into_iter().filter(|a| !a.is_empty()).collect()
}

/// Drop one pair of parentheses wrapping the whole slice.
fn strip_parens(toks: &[Token]) -> &[Token] {
    match toks {
        [first, inner @ .., last]
            if first.kind == TokenKind::LParen && last.kind == TokenKind::RParen =>
        {
            inner
        }
        _ => toks,
    }
}

/// A `.each*` call at the end of a block head.
struct EachCall {
    collection: String,
    method: String,
}

impl EachCall {
    fn condition(&self) -> String {
        format!("{}.{}", self.collection, self.method)
    }
}

fn each_call(source: &str, head: &[Token]) -> Option<EachCall> {
    let mut depth = 0usize;
    let mut dot = None;
    for (i, token) in head.iter().enumerate() {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                depth = depth.saturating_sub(1);
            }
            TokenKind::Dot | TokenKind::SafeNav if depth == 0 => {
                if head.get(i + 1).and_then(Token::ident).is_some_and(|m| m.starts_with("each")) {
                    dot = Some(i);
                }
            }
            _ => {}
        }
    }
    let dot = dot?;

    let after = &head[dot + 2..];
    let args_only = match after {
        [] => true,
        [first, .., last] => first.kind == TokenKind::LParen && last.kind == TokenKind::RParen,
        [_] => false,
    };
    if !args_only {
        return None;
    }

    let receiver_start = head[..dot]
        .iter()
        .rposition(|t| matches!(t.kind, TokenKind::Assign | TokenKind::OpAssign(_)))
        .map_or(0, |i| i + 1);
    if receiver_start >= dot {
        return None;
    }
    let collection = source[head[receiver_start].start..head[dot - 1].end].trim().to_string();
    Some(EachCall {
        collection,
        method: head[dot + 1].ident()?.to_string(),
    })
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_display(raw: &str, limit: usize) -> String {
    let collapsed = collapse(raw);
    if collapsed.chars().count() <= limit {
        collapsed
    } else {
        let mut shown: String = collapsed.chars().take(limit).collect();
        shown.push_str("...");
        shown
    }
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

enum FrameKind {
    Root,
    Resource {
        invocation: ResourceInvocation,
        start: usize,
    },
    Conditional {
        block: ConditionalBlock,
        /// `when`/`else` arms of a `case`: the `end` closes the case too
        closes_with_parent: bool,
    },
    Case {
        block: ConditionalBlock,
    },
    /// Generic block; its items belong to the enclosing frame
    Transparent,
    /// `def` / `class` / `module`: not part of execution order
    Definition,
    /// Control flow inside a resource block; properties still apply
    ResourceScope,
    /// Nested block inside a resource; captured raw under `key`
    Opaque {
        key: Option<String>,
        start: usize,
    },
}

struct Frame {
    kind: FrameKind,
    items: Vec<ExecutionItem>,
}

impl Frame {
    const fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
        }
    }
}

#[derive(Clone, Copy)]
enum Context {
    Normal,
    Resource(usize),
    Opaque,
}

struct StructuralParser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    file: PathBuf,
    options: &'a ParseOptions,
    frames: Vec<Frame>,
    facts: Vec<ParsedFileFact>,
}

impl<'a> StructuralParser<'a> {
    fn new(
        source: &'a str,
        tokens: &'a [Token],
        file: &Path,
        options: &'a ParseOptions,
    ) -> Self {
        Self {
            source,
            tokens,
            file: file.to_path_buf(),
            options,
            frames: vec![Frame::new(FrameKind::Root)],
            facts: Vec::new(),
        }
    }

    fn run(&mut self, statements: &[Range<usize>]) {
        let mut work: VecDeque<Range<usize>> = statements.iter().cloned().collect();
        while let Some(span) = work.pop_front() {
            self.statement(span, &mut work);
        }
    }

    fn finish(mut self) -> (Vec<ParsedFileFact>, Vec<ExecutionItem>) {
        if self.frames.len() > 1 {
            tracing::debug!(
                target: "parser",
                "{}: {} unclosed block(s) at end of file",
                self.file.display(),
                self.frames.len() - 1
            );
        }
        while self.frames.len() > 1 {
            self.pop_into_parent(self.source.len(), None);
        }
        let root = self.frames.pop().map(|f| f.items).unwrap_or_default();
        (self.facts, root)
    }

    fn text(&self, toks: &[Token]) -> String {
        match (toks.first(), toks.last()) {
            (Some(first), Some(last)) => self.source[first.start..last.end].trim().to_string(),
            _ => String::new(),
        }
    }

    fn context(&self) -> Context {
        for (i, frame) in self.frames.iter().enumerate().rev() {
            match frame.kind {
                FrameKind::Opaque { .. } => return Context::Opaque,
                FrameKind::Resource { .. } => return Context::Resource(i),
                FrameKind::ResourceScope => {}
                _ => return Context::Normal,
            }
        }
        Context::Normal
    }

    fn push_item(&mut self, item: ExecutionItem) {
        if let Some(frame) = self.frames.last_mut() {
            frame.items.push(item);
        }
    }

    fn statement(&mut self, span: Range<usize>, work: &mut VecDeque<Range<usize>>) {
        let tokens = self.tokens;
        let toks = &tokens[span.clone()];
        let Some(first) = toks.first() else {
            return;
        };

        if first.is_ident("end") {
            let guard = toks
                .get(1)
                .filter(|t| t.is_ident("if") || t.is_ident("unless"))
                .map(|_| collapse(&self.text(&toks[1..])));
            self.close_frame(first.end, guard);
            return;
        }

        let context = self.context();
        match first.ident() {
            Some(word @ ("elsif" | "else" | "when" | "in")) => {
                if matches!(context, Context::Normal) {
                    self.branch(word, span, work);
                }
                return;
            }
            Some("rescue" | "ensure") => return,
            _ => {}
        }

        let balance = block_balance(toks);
        if balance > 0 {
            self.open(toks, balance, context);
            return;
        }

        match context {
            Context::Opaque => {}
            Context::Resource(index) => self.resource_property(index, toks),
            Context::Normal => self.plain(toks),
        }
    }

    fn condition_text(&self, toks: &[Token]) -> String {
        let mut end = toks.len();
        while end > 1 && (toks[end - 1].is_ident("then") || toks[end - 1].is_ident("do")) {
            end -= 1;
        }
        collapse(&self.text(&toks[..end]))
    }

    fn conditional(&self, kind: ConditionalKind, toks: &[Token], nested: bool) -> FrameKind {
        FrameKind::Conditional {
            block: ConditionalBlock {
                kind,
                condition: self.condition_text(toks),
                line: toks.first().map_or(0, |t| t.line),
                variables: Vec::new(),
                children: Vec::new(),
            },
            closes_with_parent: nested,
        }
    }

    /// `elsif`, `else`, `when`, `in`.
    fn branch(&mut self, word: &str, span: Range<usize>, work: &mut VecDeque<Range<usize>>) {
        let tokens = self.tokens;
        let toks = &tokens[span.clone()];
        let (condition_end, rest_start) = if word == "else" {
            (1, 1)
        } else {
            toks.iter().position(|t| t.is_ident("then")).map_or((toks.len(), toks.len()), |i| (i, i + 1))
        };
        let head = &toks[..condition_end];

        enum Top {
            IfChain,
            CaseArm,
            Case,
            Other,
        }
        let top = match self.frames.last().map(|f| &f.kind) {
            Some(FrameKind::Conditional {
                closes_with_parent: true,
                ..
            }) => Top::CaseArm,
            Some(FrameKind::Conditional {
                block,
                ..
            }) if matches!(
                block.kind,
                ConditionalKind::If | ConditionalKind::Unless | ConditionalKind::Elsif
            ) =>
            {
                Top::IfChain
            }
            Some(FrameKind::Case { .. }) => Top::Case,
            _ => Top::Other,
        };

        let kind = match (word, &top) {
            ("elsif", Top::IfChain) => {
                self.pop_into_parent(head[0].start, None);
                self.conditional(ConditionalKind::Elsif, head, false)
            }
            ("else", Top::IfChain) => {
                self.pop_into_parent(head[0].start, None);
                self.conditional(ConditionalKind::Else, head, false)
            }
            ("else", Top::CaseArm | Top::Case) => {
                if matches!(top, Top::CaseArm) {
                    self.pop_into_parent(head[0].start, None);
                }
                self.conditional(ConditionalKind::Else, head, true)
            }
            ("when" | "in", Top::CaseArm | Top::Case) => {
                if matches!(top, Top::CaseArm) {
                    self.pop_into_parent(head[0].start, None);
                }
                self.conditional(ConditionalKind::When, head, true)
            }
            _ => return,
        };
        self.frames.push(Frame::new(kind));

        if rest_start < toks.len() {
            work.push_front(span.start + rest_start..span.end);
        }
    }

    fn open(&mut self, toks: &[Token], balance: i32, context: Context) {
        let start = toks[0].start;
        let leading_keyword = toks[0]
            .ident()
            .is_some_and(|w| KEYWORDS.contains(&w));

        let (primary, filler) = match context {
            Context::Opaque => (
                FrameKind::Opaque {
                    key: None,
                    start,
                },
                false,
            ),
            Context::Resource(_) => {
                if !leading_keyword && block_do(toks).is_some() {
                    let key = toks[0].ident().map(str::to_string);
                    let value_start = toks.get(1).map_or(start, |t| t.start);
                    (
                        FrameKind::Opaque {
                            key,
                            start: value_start,
                        },
                        false,
                    )
                } else {
                    (FrameKind::ResourceScope, false)
                }
            }
            Context::Normal => (self.normal_opener(toks), true),
        };
        self.frames.push(Frame::new(primary));

        for _ in 1..balance {
            let extra = if filler {
                FrameKind::Transparent
            } else {
                FrameKind::Opaque {
                    key: None,
                    start,
                }
            };
            self.frames.push(Frame::new(extra));
        }
    }

    fn normal_opener(&mut self, toks: &[Token]) -> FrameKind {
        match toks[0].ident() {
            Some("if") => return self.conditional(ConditionalKind::If, toks, false),
            Some("unless") => return self.conditional(ConditionalKind::Unless, toks, false),
            Some("while") => return self.conditional(ConditionalKind::While, toks, false),
            Some("until") => return self.conditional(ConditionalKind::Until, toks, false),
            Some("for") => return self.conditional(ConditionalKind::For, toks, false),
            Some("case") => {
                return FrameKind::Case {
                    block: ConditionalBlock {
                        kind: ConditionalKind::Case,
                        condition: self.condition_text(toks),
                        line: toks[0].line,
                        variables: Vec::new(),
                        children: Vec::new(),
                    },
                };
            }
            Some("begin") => return FrameKind::Transparent,
            Some("def" | "class" | "module") => return FrameKind::Definition,
            _ => {}
        }

        // `x = if ...`, `default['x'] = case ...`
        if let Some(assignment) = self.attribute_assignment(toks) {
            self.facts.push(ParsedFileFact::AttributeAssignment(assignment));
            return FrameKind::Transparent;
        }

        let Some((do_index, params)) = block_do(toks) else {
            return FrameKind::Transparent;
        };
        let head = &toks[..do_index];

        if let Some(invocation) = self.resource_call(head, true) {
            return FrameKind::Resource {
                invocation,
                start: toks[0].start,
            };
        }
        if let Some(each) = each_call(self.source, head) {
            return FrameKind::Conditional {
                block: ConditionalBlock {
                    kind: ConditionalKind::Each,
                    condition: each.condition(),
                    line: toks[0].line,
                    variables: params,
                    children: Vec::new(),
                },
                closes_with_parent: false,
            };
        }
        FrameKind::Transparent
    }

    fn close_frame(&mut self, end: usize, mut guard: Option<String>) {
        loop {
            if self.frames.len() <= 1 {
                tracing::trace!(target: "parser", "{}: unmatched 'end'", self.file.display());
                return;
            }
            if !self.pop_into_parent(end, guard.take()) {
                return;
            }
        }
    }

    /// Pop the top frame into its parent. Returns whether the parent must be
    /// closed as well.
    fn pop_into_parent(&mut self, end: usize, guard: Option<String>) -> bool {
        if self.frames.len() <= 1 {
            return false;
        }
        let Some(frame) = self.frames.pop() else {
            return false;
        };
        let end = end.min(self.source.len());

        match frame.kind {
            FrameKind::Resource {
                mut invocation,
                start,
            } => {
                invocation.raw = self.source[start..end].to_string();
                if let Some(guard) = guard {
                    invocation.add_attribute("guard", guard);
                }
                self.facts.push(ParsedFileFact::ResourceInvocation(invocation.clone()));
                self.push_item(ExecutionItem::Resource(invocation));
                false
            }
            FrameKind::Conditional {
                mut block,
                closes_with_parent,
            } => {
                block.children = frame.items;
                self.push_item(ExecutionItem::Conditional(block));
                closes_with_parent
            }
            FrameKind::Case {
                mut block,
            } => {
                block.children = frame.items;
                self.push_item(ExecutionItem::Conditional(block));
                false
            }
            FrameKind::Transparent => {
                if let Some(parent) = self.frames.last_mut() {
                    parent.items.extend(frame.items);
                }
                false
            }
            FrameKind::Opaque {
                key: Some(key),
                start,
            } if RECOGNIZED_PROPERTIES.contains(&key.as_str()) => {
                let value = self.source[start.min(end)..end].trim().to_string();
                if let Some(invocation) = self.nearest_resource() {
                    invocation.add_attribute(&key, value);
                }
                false
            }
            FrameKind::Root => {
                self.frames.push(frame);
                false
            }
            FrameKind::Definition | FrameKind::ResourceScope | FrameKind::Opaque { .. } => false,
        }
    }

    fn nearest_resource(&mut self) -> Option<&mut ResourceInvocation> {
        self.frames.iter_mut().rev().find_map(|frame| match &mut frame.kind {
            FrameKind::Resource {
                invocation,
                ..
            } => Some(invocation),
            _ => None,
        })
    }

    /// A property line inside a resource block.
    fn resource_property(&mut self, index: usize, toks: &[Token]) {
        let main = modifier_index(toks).map_or(toks, |i| &toks[..i]);
        let Some(key) = main.first().and_then(Token::ident) else {
            return;
        };
        let rest = &main[1..];
        let value = match rest.first().map(|t| &t.kind) {
            Some(TokenKind::Assign | TokenKind::OpAssign(_)) => self.text(&rest[1..]),
            _ if RECOGNIZED_PROPERTIES.contains(&key) => self.text(strip_parens(rest)),
            _ => return,
        };
        let key = key.to_string();
        if let Some(FrameKind::Resource {
            invocation,
            ..
        }) = self.frames.get_mut(index).map(|f| &mut f.kind)
        {
            invocation.add_attribute(&key, value);
        }
    }

    /// A statement outside any resource block that opens nothing.
    fn plain(&mut self, toks: &[Token]) {
        let (main, guard) = match modifier_index(toks) {
            Some(i) => (&toks[..i], Some((toks[i].ident().unwrap_or("if").to_string(), &toks[i..]))),
            None => (toks, None),
        };
        let Some(first) = main.first() else {
            return;
        };

        match first.ident() {
            Some("include_recipe") => {
                for reference in self.references(main, ReferenceKind::IncludeRecipe) {
                    self.facts.push(ParsedFileFact::RecipeReference(reference.clone()));
                    let item = ExecutionItem::Include(reference);
                    let item = match &guard {
                        Some((keyword, guard_toks)) if keyword == "if" || keyword == "unless" => {
                            ExecutionItem::Conditional(ConditionalBlock {
                                kind: if keyword == "if" {
                                    ConditionalKind::If
                                } else {
                                    ConditionalKind::Unless
                                },
                                condition: collapse(&self.text(guard_toks)),
                                line: first.line,
                                variables: Vec::new(),
                                children: vec![item],
                            })
                        }
                        _ => item,
                    };
                    self.push_item(item);
                }
                return;
            }
            Some(word @ ("require" | "require_relative")) => {
                let kind = if word == "require" {
                    ReferenceKind::Require
                } else {
                    ReferenceKind::RequireRelative
                };
                for reference in self.references(main, kind) {
                    self.facts.push(ParsedFileFact::RecipeReference(reference));
                }
                return;
            }
            _ => {}
        }

        if let Some(assignment) = self.attribute_assignment(main) {
            self.facts.push(ParsedFileFact::AttributeAssignment(assignment));
            return;
        }

        let inline_do = main.iter().enumerate().position(|(i, t)| t.is_ident("do") && !is_member_access(main, i));
        let head = inline_do.map_or(main, |i| &main[..i]);
        if let Some(mut invocation) = self.resource_call(head, inline_do.is_some()) {
            if let Some(i) = inline_do
                && main.last().is_some_and(|t| t.is_ident("end"))
                && i + 1 < main.len() - 1
            {
                let body = &main[i + 1..main.len() - 1];
                self.apply_inline_property(&mut invocation, body);
            }
            invocation.raw = self.text(toks);
            if let Some((_, guard_toks)) = &guard {
                invocation.add_attribute("guard", collapse(&self.text(guard_toks)));
            }
            self.facts.push(ParsedFileFact::ResourceInvocation(invocation.clone()));
            self.push_item(ExecutionItem::Resource(invocation));
        }
    }

    fn apply_inline_property(&self, invocation: &mut ResourceInvocation, body: &[Token]) {
        let Some(key) = body.first().and_then(Token::ident) else {
            return;
        };
        if RECOGNIZED_PROPERTIES.contains(&key) {
            invocation.add_attribute(key, self.text(strip_parens(&body[1..])));
        }
    }

    fn references(&self, toks: &[Token], kind: ReferenceKind) -> Vec<RecipeReference> {
        split_args(strip_parens(&toks[1..]))
            .into_iter()
            .map(|arg| {
                let (target, dynamic) = match arg {
                    [Token {
                        kind:
                            TokenKind::Str {
                                value,
                                interpolated,
                            },
                        ..
                    }] => (value.clone(), *interpolated),
                    other => (self.text(other), true),
                };
                RecipeReference {
                    file: self.file.clone(),
                    line: toks[0].line,
                    kind,
                    target,
                    dynamic,
                }
            })
            .collect()
    }

    /// Resource call at the start of `head` (the statement without its `do`).
    fn resource_call(&self, head: &[Token], has_block: bool) -> Option<ResourceInvocation> {
        let first = head.first()?;
        let word = first.ident()?;
        if KEYWORDS.contains(&word) || word.starts_with(['@', '$']) || word.ends_with(['?', '!']) {
            return None;
        }
        let next = head.get(1).map(|t| &t.kind);
        if matches!(
            next,
            Some(
                TokenKind::Dot
                    | TokenKind::SafeNav
                    | TokenKind::Assign
                    | TokenKind::OpAssign(_)
                    | TokenKind::LBracket
                    | TokenKind::DoubleColon
                    | TokenKind::Op(_)
                    | TokenKind::Comma
                    | TokenKind::FatArrow
            )
        ) {
            return None;
        }

        let builtin = BUILTIN_RESOURCES.contains(&word);
        if builtin {
            if head.len() == 1 && !has_block {
                return None;
            }
        } else {
            if !word.contains('_')
                || DSL_HELPERS.contains(&word)
                || matches!(next, Some(TokenKind::LParen))
            {
                return None;
            }
            let string_arg = matches!(next, Some(TokenKind::Str { .. }));
            if !string_arg && !has_block {
                return None;
            }
        }

        let args = split_args(strip_parens(&head[1..]));
        let (name, dynamic_name) = match args.first() {
            None => (None, false),
            Some(
                [Token {
                    kind:
                        TokenKind::Str {
                            value,
                            interpolated,
                        },
                    ..
                }],
            ) => (Some(value.clone()), *interpolated),
            Some(other) => (Some(self.text(other)), true),
        };

        Some(ResourceInvocation {
            file: self.file.clone(),
            line: first.line,
            resource_type: word.to_string(),
            name,
            dynamic_name,
            custom: !builtin,
            attributes: BTreeMap::new(),
            raw: String::new(),
        })
    }

    /// `node.default['a']['b'] = v`, `default['a'] ||= v`, `node.set.a.b = v`.
    fn attribute_assignment(&self, toks: &[Token]) -> Option<AttributeAssignment> {
        let mut i = 0;
        if toks.first()?.is_ident("node")
            && matches!(toks.get(1)?.kind, TokenKind::Dot | TokenKind::SafeNav)
        {
            i = 2;
        }
        let precedence = Precedence::from_keyword(toks.get(i)?.ident()?)?;
        i += 1;

        let mut path = Vec::new();
        loop {
            match &toks.get(i)?.kind {
                TokenKind::LBracket => {
                    let mut depth = 0usize;
                    let close = toks[i..].iter().position(|t| {
                        match t.kind {
                            TokenKind::LBracket => depth += 1,
                            TokenKind::RBracket => depth -= 1,
                            _ => {}
                        }
                        depth == 0
                    })? + i;
                    let key = &toks[i + 1..close];
                    path.push(match key {
                        [Token {
                            kind:
                                TokenKind::Str {
                                    value,
                                    interpolated: false,
                                },
                            ..
                        }]
                        | [Token {
                            kind: TokenKind::Symbol(value),
                            ..
                        }] => value.clone(),
                        other => self.text(other),
                    });
                    i = close + 1;
                }
                TokenKind::Dot => {
                    path.push(toks.get(i + 1)?.ident()?.to_string());
                    i += 2;
                }
                TokenKind::Assign | TokenKind::OpAssign(_) => break,
                _ => return None,
            }
        }
        if path.is_empty() {
            return None;
        }

        let value_toks = &toks[i + 1..];
        let raw_value = self.text(value_toks);
        Some(AttributeAssignment {
            file: self.file.clone(),
            line: toks[0].line,
            precedence,
            path,
            display_value: truncate_display(&raw_value, self.options.value_display_limit),
            value: literal::evaluate(value_toks),
            raw_value,
        })
    }
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

/// Dedicated scan for `<collection>.each do |vars| ... end`.
fn scan_loops(
    source: &str,
    tokens: &[Token],
    statements: &[Range<usize>],
    file: &Path,
) -> Vec<LoopConstruct> {
    let mut loops: Vec<LoopConstruct> = Vec::new();
    let mut open: Vec<Option<usize>> = Vec::new();

    for span in statements {
        let toks = &tokens[span.clone()];
        let Some(first) = toks.first() else {
            continue;
        };
        if first.is_ident("end") {
            if let Some(Some(index)) = open.pop() {
                loops[index].end_line = first.line;
            }
            continue;
        }

        let balance = block_balance(toks);
        if balance <= 0 {
            continue;
        }
        let mut remaining = balance;
        if let Some((do_index, variables)) = block_do(toks)
            && !first.ident().is_some_and(|w| KEYWORDS.contains(&w))
            && let Some(each) = each_call(source, &toks[..do_index])
        {
            loops.push(LoopConstruct {
                file: file.to_path_buf(),
                line: first.line,
                end_line: first.line,
                collection: each.collection,
                method: each.method,
                variables,
            });
            open.push(Some(loops.len() - 1));
            remaining -= 1;
        }
        for _ in 0..remaining {
            open.push(None);
        }
    }

    let last_line = tokens.last().map_or(1, |t| t.line);
    for index in open.into_iter().flatten() {
        loops[index].end_line = last_line;
    }
    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_str(src: &str) -> ParsedFile {
        parse(src, Path::new("recipes/default.rb"), &ParseOptions::default())
    }

    fn only_resource(item: &ExecutionItem) -> &ResourceInvocation {
        match item {
            ExecutionItem::Resource(r) => r,
            other => panic!("expected resource, got {other:?}"),
        }
    }

    fn only_conditional(item: &ExecutionItem) -> &ConditionalBlock {
        match item {
            ExecutionItem::Conditional(c) => c,
            other => panic!("expected conditional, got {other:?}"),
        }
    }

    #[test]
    fn test_resource_with_block() {
        let parsed = parse_str(
            "package 'nginx' do\n  action :install\n  version '1.2'\n  retries 3\n  flags '-y'\nend\n",
        );
        assert_eq!(parsed.execution.len(), 1);
        let r = only_resource(&parsed.execution[0]);
        assert_eq!(r.resource_type, "package");
        assert_eq!(r.name.as_deref(), Some("nginx"));
        assert!(!r.dynamic_name);
        assert!(!r.custom);
        assert_eq!(r.line, 1);
        assert_eq!(r.attributes.get("action").map(String::as_str), Some(":install"));
        assert_eq!(r.attributes.get("version").map(String::as_str), Some("'1.2'"));
        assert!(!r.attributes.contains_key("flags"));
        assert!(r.raw.starts_with("package 'nginx' do"));
        assert!(r.raw.ends_with("end"));
        assert_eq!(parsed.resources().count(), 1);
    }

    #[test]
    fn test_dynamic_name_and_repeated_notifies() {
        let parsed = parse_str(
            r#"template "/etc/nginx/#{site}.conf" do
  source 'site.erb'
  variables(port: node['nginx']['port'])
  notifies :reload, 'service[nginx]', :delayed
  notifies :restart, 'service[php]'
  helper = 'x'
end
"#,
        );
        let r = only_resource(&parsed.execution[0]);
        assert!(r.dynamic_name);
        assert_eq!(r.name.as_deref(), Some("/etc/nginx/#{site}.conf"));
        assert_eq!(r.attributes["variables"], "port: node['nginx']['port']");
        assert_eq!(
            r.attributes["notifies"],
            ":reload, 'service[nginx]', :delayed\n:restart, 'service[php]'"
        );
        assert_eq!(r.attributes["helper"], "'x'");
    }

    #[test]
    fn test_single_line_resources_and_guard() {
        let parsed = parse_str("package 'redis'\nservice 'redis' do action :start end\npackage 'vim' if node['dev']\n");
        assert_eq!(parsed.execution.len(), 3);
        assert_eq!(only_resource(&parsed.execution[0]).display_name(), "package[redis]");
        assert_eq!(only_resource(&parsed.execution[1]).attributes["action"], ":start");
        assert_eq!(only_resource(&parsed.execution[2]).attributes["guard"], "if node['dev']");
    }

    #[test]
    fn test_guard_blocks_captured_raw() {
        let parsed = parse_str(
            "execute 'migrate' do\n  command 'rake db:migrate'\n  only_if do\n    File.exist?('/x')\n  end\n  not_if { ::File.exist?('/y') }\nend\n",
        );
        let r = only_resource(&parsed.execution[0]);
        assert_eq!(r.attributes["command"], "'rake db:migrate'");
        assert!(r.attributes["only_if"].starts_with("do"));
        assert!(r.attributes["only_if"].contains("File.exist?('/x')"));
        assert_eq!(r.attributes["not_if"], "{ ::File.exist?('/y') }");
    }

    #[test]
    fn test_include_and_require() {
        let parsed = parse_str(
            "require 'json'\ninclude_recipe 'cache::default'\ninclude_recipe 'base' if node['base']\n",
        );
        let refs: Vec<_> = parsed.references().collect();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].kind, ReferenceKind::Require);
        assert_eq!(refs[1].recipe_name().map(|r| r.to_string()).as_deref(), Some("cache::default"));
        assert_eq!(refs[2].recipe_name().map(|r| r.to_string()).as_deref(), Some("base::default"));

        assert_eq!(parsed.execution.len(), 2);
        assert!(matches!(parsed.execution[0], ExecutionItem::Include(_)));
        let guarded = only_conditional(&parsed.execution[1]);
        assert_eq!(guarded.condition, "if node['base']");
        assert!(matches!(guarded.children[0], ExecutionItem::Include(_)));
    }

    #[test]
    fn test_conditionals_nest_and_chain() {
        let parsed = parse_str(
            "if platform?('ubuntu')\n  package 'apt-x'\nelsif platform?('centos') then\n  package 'yum-x'\nelse\n  log 'unsupported'\nend\n",
        );
        assert_eq!(parsed.execution.len(), 3);
        let first = only_conditional(&parsed.execution[0]);
        assert_eq!(first.kind, ConditionalKind::If);
        assert_eq!(first.condition, "if platform?('ubuntu')");
        assert_eq!(only_resource(&first.children[0]).name.as_deref(), Some("apt-x"));
        let second = only_conditional(&parsed.execution[1]);
        assert_eq!(second.kind, ConditionalKind::Elsif);
        assert_eq!(second.condition, "elsif platform?('centos')");
        assert_eq!(only_conditional(&parsed.execution[2]).kind, ConditionalKind::Else);
    }

    #[test]
    fn test_case_when() {
        let parsed = parse_str(
            "case node['platform']\nwhen 'debian', 'ubuntu'\n  package 'a'\nwhen 'centos' then package 'b'\nelse\n  package 'c'\nend\npackage 'after'\n",
        );
        assert_eq!(parsed.execution.len(), 2);
        let case = only_conditional(&parsed.execution[0]);
        assert_eq!(case.kind, ConditionalKind::Case);
        assert_eq!(case.children.len(), 3);
        let inline_when = only_conditional(&case.children[1]);
        assert_eq!(inline_when.condition, "when 'centos'");
        assert_eq!(only_resource(&inline_when.children[0]).name.as_deref(), Some("b"));
        assert_eq!(only_resource(&parsed.execution[1]).name.as_deref(), Some("after"));
    }

    #[test]
    fn test_each_loop_item_and_fact() {
        let parsed = parse_str(
            "node['nginx']['sites'].each do |name, site|\n  template \"/etc/nginx/#{name}\" do\n    source 'site.erb'\n  end\nend\n",
        );
        let each = only_conditional(&parsed.execution[0]);
        assert_eq!(each.kind, ConditionalKind::Each);
        assert_eq!(each.condition, "node['nginx']['sites'].each");
        assert_eq!(each.variables, vec!["name", "site"]);
        assert_eq!(each.children.len(), 1);

        let loops: Vec<_> = parsed.loops().collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].collection, "node['nginx']['sites']");
        assert_eq!(loops[0].line, 1);
        assert_eq!(loops[0].end_line, 5);
    }

    #[test]
    fn test_words_loop() {
        let parsed = parse_str("%w(git curl).each do |pkg|\n  package pkg\nend\n");
        let each = only_conditional(&parsed.execution[0]);
        assert_eq!(each.condition, "%w(git curl).each");
        let r = only_resource(&each.children[0]);
        assert_eq!(r.name.as_deref(), Some("pkg"));
        assert!(r.dynamic_name);
    }

    #[test]
    fn test_generic_blocks_are_transparent() {
        let parsed = parse_str(
            "action :create do\n  directory new_resource.path do\n    recursive true\n  end\nend\n",
        );
        assert_eq!(parsed.execution.len(), 1);
        let r = only_resource(&parsed.execution[0]);
        assert_eq!(r.resource_type, "directory");
        assert_eq!(r.name.as_deref(), Some("new_resource.path"));
    }

    #[test]
    fn test_definitions_excluded_from_execution() {
        let parsed = parse_str(
            "def helper(x)\n  if x\n    package 'inner'\n  end\nend\npackage 'outer'\n",
        );
        assert_eq!(parsed.execution.len(), 1);
        assert_eq!(only_resource(&parsed.execution[0]).name.as_deref(), Some("outer"));
        assert_eq!(parsed.resources().count(), 2);
    }

    #[test]
    fn test_custom_resources() {
        let parsed = parse_str(
            "nginx_site 'default' do\n  enable true\nend\nmy_helper(1)\nsome_call\n",
        );
        assert_eq!(parsed.execution.len(), 1);
        let r = only_resource(&parsed.execution[0]);
        assert!(r.custom);
        assert_eq!(r.resource_type, "nginx_site");
    }

    #[test]
    fn test_attribute_assignments() {
        let parsed = parse(
            "default['nginx']['port'] = 80\nnode.override[:nginx][:user] = 'www'\ndefault['nginx']['sites'] = {\n  'a' => {},\n  'b' => {}\n}\nnormal['x'] ||= node['y']\nlocal = 1\nnode.set.app.name = 'z'\n",
            Path::new("attributes/default.rb"),
            &ParseOptions {
                value_display_limit: 10,
            },
        );
        let assignments: Vec<_> = parsed.assignments().collect();
        assert_eq!(assignments.len(), 5);
        assert_eq!(assignments[0].dotted_path(), "nginx.port");
        assert_eq!(assignments[0].value, Some(json!(80)));
        assert_eq!(assignments[1].precedence, Precedence::Override);
        assert_eq!(assignments[1].path, vec!["nginx", "user"]);
        assert_eq!(assignments[2].line, 3);
        assert_eq!(assignments[2].value, Some(json!({"a": {}, "b": {}})));
        assert_eq!(assignments[2].display_value, "{ 'a' => {...");
        assert_eq!(assignments[3].value, None);
        assert_eq!(assignments[3].raw_value, "node['y']");
        assert_eq!(assignments[4].precedence, Precedence::Set);
        assert_eq!(assignments[4].dotted_path(), "app.name");
    }

    #[test]
    fn test_heredoc_lines_are_not_statements() {
        let parsed = parse_str(
            "file '/etc/motd' do\n  content <<~EOS\n    package 'not-a-resource'\n    end\n  EOS\nend\npackage 'real'\n",
        );
        assert_eq!(parsed.execution.len(), 2);
        let file = only_resource(&parsed.execution[0]);
        assert!(file.attributes["content"].starts_with("<<~EOS"));
        assert_eq!(only_resource(&parsed.execution[1]).line, 7);
    }

    #[test]
    fn test_modifier_does_not_open_block() {
        let parsed = parse_str(
            "log 'x' unless node['quiet']\nresult = if node['a'] then 1 else 2 end\nwhile running? do\n  package 'loop'\nend\npackage 'after'\n",
        );
        assert_eq!(parsed.execution.len(), 3);
        let w = only_conditional(&parsed.execution[1]);
        assert_eq!(w.kind, ConditionalKind::While);
        assert_eq!(w.condition, "while running?");
    }

    #[test]
    fn test_deep_nesting_is_iterative() {
        let depth = 1_000;
        let mut src = String::new();
        for _ in 0..depth {
            src.push_str("if x\n");
        }
        src.push_str("package 'deep'\n");
        for _ in 0..depth {
            src.push_str("end\n");
        }
        let parsed = parse_str(&src);
        assert_eq!(parsed.resources().count(), 1);
        assert_eq!(parsed.execution.len(), 1);
    }

    #[test]
    fn test_unclosed_blocks_are_flushed() {
        let parsed = parse_str("if x\n  package 'a'\n");
        assert_eq!(parsed.execution.len(), 1);
        assert_eq!(only_conditional(&parsed.execution[0]).children.len(), 1);
    }

    #[test]
    fn test_facts_sorted_by_line() {
        let parsed = parse_str(
            "%w(a b).each do |p|\n  package p\nend\ninclude_recipe 'x'\n",
        );
        let lines: Vec<_> = parsed.facts.iter().map(ParsedFileFact::line).collect();
        let mut sorted = lines.clone();
        sorted.sort_unstable();
        assert_eq!(lines, sorted);
        assert!(parsed.facts.iter().all(|f| f.file() == Path::new("recipes/default.rb")));
    }
}
