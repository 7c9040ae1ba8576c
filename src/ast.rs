use std::collections::HashSet;
use std::fmt::{self, Debug};
use std::ops::Range;

use display_tree::{AsTree, DisplayTree, Style};

use crate::{
    grammar::{GoalId, Grammar},
    memo::MemoTable,
};

/// Options for [`Engine::ast`](crate::Engine::ast). Productions named in the
/// ignore set are omitted from the tree entirely and their matched text is
/// dropped by [`Node::stripped`].
#[derive(Debug, Clone, Default)]
pub struct AstOptions {
    ignored: Vec<String>,
}

impl AstOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses one production.
    #[must_use]
    pub fn ignore(mut self, name: impl Into<String>) -> Self {
        self.ignored.push(name.into());
        self
    }

    /// Suppresses several productions at once.
    #[must_use]
    pub fn ignore_all<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.ignored.extend(names.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct NodeData {
    goal: GoalId,
    start: usize,
    end: usize,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

/// The tree of named productions recorded by one parse.
///
/// The arena owns its nodes and a copy of the production names, so the tree
/// only borrows the source text and outlives the engine that built it.
#[derive(Debug)]
pub struct Ast<'s> {
    source: &'s str,
    names: Vec<Box<str>>,
    nodes: Vec<NodeData>,
    /// Merged, ordered ranges covered by suppressed productions.
    ignored: Vec<(usize, usize)>,
}

impl<'s> Ast<'s> {
    pub fn source(&self) -> &'s str {
        self.source
    }

    /// The root node: the goal of the parse that produced this tree.
    pub fn root(&self) -> Node<'_, 's> {
        Node {
            ast: self,
            id: NodeId(0),
        }
    }

    /// Total number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> Node<'_, 's> {
        Node { ast: self, id }
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }
}

/// A handle to one node of an [`Ast`].
#[derive(Clone, Copy)]
pub struct Node<'a, 's> {
    ast: &'a Ast<'s>,
    id: NodeId,
}

impl Debug for Node<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..{}]", self.name(), self.start(), self.end())
    }
}

impl PartialEq for Node<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.ast, other.ast) && self.id == other.id
    }
}

impl<'a, 's> Node<'a, 's> {
    /// The production that matched here.
    pub fn name(&self) -> &'a str {
        &self.ast.names[self.data().goal.index()]
    }

    /// The half-open byte range this node covers.
    pub fn range(&self) -> Range<usize> {
        self.data().start..self.data().end
    }

    pub fn start(&self) -> usize {
        self.data().start
    }

    pub fn end(&self) -> usize {
        self.data().end
    }

    /// Length of the covered range in bytes.
    pub fn len(&self) -> usize {
        self.data().end - self.data().start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The covered source text.
    pub fn text(&self) -> &'s str {
        &self.ast.source[self.range()]
    }

    /// The covered source text with every range matched by a suppressed
    /// production cut out.
    pub fn stripped(&self) -> String {
        let Range { start, end } = self.range();
        let mut out = String::new();
        let mut pos = start;
        for &(cut_start, cut_end) in &self.ast.ignored {
            if cut_end <= start {
                continue;
            }
            if cut_start >= end {
                break;
            }
            let cut_start = cut_start.max(pos);
            out.push_str(&self.ast.source[pos..cut_start]);
            pos = cut_end.min(end).max(pos);
        }
        out.push_str(&self.ast.source[pos..end]);
        out
    }

    pub fn parent(&self) -> Option<Node<'a, 's>> {
        Some(self.ast.node(self.data().parent?))
    }

    /// Children in source order.
    pub fn children(&self) -> Children<'a, 's> {
        Children {
            ast: self.ast,
            next: self.data().first_child,
        }
    }

    /// Children whose production is `name`.
    pub fn children_named(self, name: &str) -> impl Iterator<Item = Node<'a, 's>> {
        let name = name.to_owned();
        self.children().filter(move |child| child.name() == name)
    }

    /// How many children are named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.children_named(name).count()
    }

    /// The first child named `name`, if any.
    pub fn find(&self, name: &str) -> Option<Node<'a, 's>> {
        self.children_named(name).next()
    }

    /// Distance to the root; the root itself is at depth 0.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut node = *self;
        while let Some(parent) = node.parent() {
            depth += 1;
            node = parent;
        }
        depth
    }

    pub fn first_child(&self) -> Option<Node<'a, 's>> {
        Some(self.ast.node(self.data().first_child?))
    }

    pub fn last_child(&self) -> Option<Node<'a, 's>> {
        Some(self.ast.node(self.data().last_child?))
    }

    pub fn next_sibling(&self) -> Option<Node<'a, 's>> {
        Some(self.ast.node(self.data().next_sibling?))
    }

    fn data(&self) -> &NodeData {
        self.ast.data(self.id)
    }
}

/// Iterator over a node's children.
#[derive(Debug, Clone, Copy)]
pub struct Children<'a, 's> {
    ast: &'a Ast<'s>,
    next: Option<NodeId>,
}

impl<'a, 's> Iterator for Children<'a, 's> {
    type Item = Node<'a, 's>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.ast.data(id).next_sibling;
        Some(self.ast.node(id))
    }
}

impl DisplayTree for Node<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter, style: Style) -> fmt::Result {
        write!(
            f,
            "{} [{}..{}]",
            style.leaf_style.apply(self.name()),
            self.start(),
            self.end()
        )?;
        if self.first_child().is_none() && !self.is_empty() {
            write!(f, " \"{}\"", self.text().escape_debug())?;
        }

        let children: Vec<_> = self.children().collect();
        let count = children.len();
        for (n, child) in children.into_iter().enumerate() {
            let last = n + 1 == count;
            let lead = if last {
                style.char_set.end_connector
            } else {
                style.char_set.connector
            };
            let bar = if last {
                ' '
            } else {
                style.char_set.vertical
            };
            let rendered = AsTree::with_style(&child, style).to_string();
            for (line_no, line) in rendered.lines().enumerate() {
                writeln!(f)?;
                if line_no == 0 {
                    write!(f, "{lead}{}{line}", style.char_set.horizontal)?;
                } else {
                    write!(f, "{bar} {line}")?;
                }
            }
        }
        Ok(())
    }
}

/// Reconstructs the tree from the memo table. `goal` matched over
/// `[at, end)`; its record and everything recorded at inner positions is
/// walked outermost-first.
pub(crate) fn build<'s>(
    grammar: &Grammar,
    source: &'s str,
    memo: &MemoTable,
    options: &AstOptions,
    goal: GoalId,
    at: usize,
    end: usize,
) -> Ast<'s> {
    let names = (0..grammar.len())
        .map(|n| {
            grammar
                .name(GoalId(u32::try_from(n).unwrap_or_else(|_| unreachable!())))
                .into()
        })
        .collect();
    let suppress: Vec<GoalId> = options
        .ignored
        .iter()
        .filter_map(|name| grammar.goal(name))
        .collect();

    let mut builder = Builder {
        memo,
        suppress,
        nodes: vec![],
        claimed: HashSet::new(),
    };
    let root = builder.push(goal, at, end, None);
    let order = builder.order_after(at, goal);
    builder.fill(root, at, order);

    Ast {
        source,
        names,
        ignored: collect_ignored(memo, &builder.suppress),
        nodes: builder.nodes,
    }
}

struct Builder<'m> {
    memo: &'m MemoTable,
    suppress: Vec<GoalId>,
    nodes: Vec<NodeData>,
    /// `(index, goal)` pairs already wrapped as nodes, so a goal visible
    /// from two scan paths is claimed once.
    claimed: HashSet<(usize, GoalId)>,
}

impl Builder<'_> {
    fn push(&mut self, goal: GoalId, start: usize, end: usize, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or_else(|_| unreachable!()));
        self.nodes.push(NodeData {
            goal,
            start,
            end,
            parent,
            first_child: None,
            last_child: None,
            next_sibling: None,
        });
        self.claimed.insert((start, goal));

        if let Some(parent) = parent {
            let previous = self.nodes[parent.index()].last_child.replace(id);
            match previous {
                Some(sibling) => self.nodes[sibling.index()].next_sibling = Some(id),
                None => self.nodes[parent.index()].first_child = Some(id),
            }
        }
        id
    }

    /// Index into the reversed found order just past `goal` at `at`.
    fn order_after(&self, at: usize, goal: GoalId) -> usize {
        let found = self.memo.found_at(at);
        found
            .iter()
            .rev()
            .position(|&g| g == goal)
            .map_or(0, |n| n + 1)
    }

    /// Attaches every production recorded inside the parent's range,
    /// outermost-first. `order` is how far into the reversed found order at
    /// `from` the scan starts; positions past `from` start at 0.
    fn fill(&mut self, parent: NodeId, from: usize, mut order: usize) {
        let parent_end = self.nodes[parent.index()].end;
        let mut at = from;
        while at <= parent_end {
            let found = self.memo.found_at(at);
            let mut wrapped = None;
            while order < found.len() {
                let goal = found[found.len() - 1 - order];
                order += 1;
                if self.suppress.contains(&goal) || self.claimed.contains(&(at, goal)) {
                    continue;
                }
                let Some(end) = self.memo.end_of_goal(at, goal) else {
                    continue;
                };
                if end > parent_end {
                    continue;
                }
                wrapped = Some((goal, end));
                break;
            }

            match wrapped {
                Some((goal, end)) => {
                    let node = self.push(goal, at, end, Some(parent));
                    self.fill(node, at, order);
                    at = end.max(at + 1);
                }
                None => at += 1,
            }
            order = 0;
        }
    }
}

fn collect_ignored(memo: &MemoTable, suppress: &[GoalId]) -> Vec<(usize, usize)> {
    let mut ranges = vec![];
    for at in 0..memo.positions() {
        for &goal in memo.found_at(at) {
            if suppress.contains(&goal)
                && let Some(end) = memo.end_of_goal(at, goal)
                && end > at
            {
                ranges.push((at, end));
            }
        }
    }
    ranges.sort_unstable();

    let mut merged: Vec<(usize, usize)> = vec![];
    for (start, end) in ranges {
        if let Some(last) = merged.last_mut()
            && start <= last.1
        {
            last.1 = last.1.max(end);
        } else {
            merged.push((start, end));
        }
    }
    merged
}
