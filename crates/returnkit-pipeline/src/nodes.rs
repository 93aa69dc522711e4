//! Node-event adapter
//!
//! Turns primitive element events from any XML tokenizer into pipeline
//! events. Elements whose tag is mapped to a table id become one row of that
//! table; leaf elements inside a row become its cells. A row nested inside
//! another row also receives the leaf cells its ancestors have produced so
//! far (e.g. a child identifier written before the nested records).
//!
//! Rows are emitted as they close, each in its own `StartTable`/`EndTable`
//! block. They carry no row number: element rows are not row-addressable.

use std::collections::{BTreeMap, VecDeque};

use returnkit_core::Event;

/// A primitive element event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Start(String),
    Text(String),
    End(String),
}

#[derive(Debug)]
enum Frame {
    Row {
        table: String,
        cells: Vec<(String, String)>,
    },
    Element {
        tag: String,
        text: String,
        has_children: bool,
    },
}

/// Lazy event stream over node events
pub struct NodeEvents<I> {
    nodes: I,
    tables: BTreeMap<String, String>,
    stack: Vec<Frame>,
    pending: VecDeque<Event>,
    started: bool,
    finished: bool,
}

impl<I> NodeEvents<I>
where
    I: Iterator<Item = NodeEvent>,
{
    /// `tables` maps element tags to table ids
    pub fn new(nodes: I, tables: BTreeMap<String, String>) -> Self {
        Self {
            nodes,
            tables,
            stack: Vec::new(),
            pending: VecDeque::new(),
            started: false,
            finished: false,
        }
    }

    fn inherited_cells(&self) -> Vec<(String, String)> {
        let mut cells: Vec<(String, String)> = Vec::new();
        for frame in &self.stack {
            if let Frame::Row { cells: row_cells, .. } = frame {
                for (header, value) in row_cells {
                    if let Some(existing) = cells.iter_mut().find(|(h, _)| h == header) {
                        existing.1 = value.clone();
                    } else {
                        cells.push((header.clone(), value.clone()));
                    }
                }
            }
        }
        cells
    }

    fn emit_row(&mut self, table: String, cells: Vec<(String, String)>) {
        let mut merged = self.inherited_cells();
        merged.retain(|(header, _)| !cells.iter().any(|(h, _)| h == header));
        merged.extend(cells);

        self.pending.push_back(Event::start_named_table(table));
        self.pending.push_back(Event::start_row(None));
        for (header, value) in merged {
            self.pending.push_back(Event::cell(header, value));
        }
        self.pending.push_back(Event::end_row());
        self.pending.push_back(Event::end_table());
    }

    fn handle(&mut self, node: NodeEvent) {
        match node {
            NodeEvent::Start(tag) => {
                if let Some(Frame::Element { has_children, .. }) = self.stack.last_mut() {
                    *has_children = true;
                }
                let frame = match self.tables.get(&tag) {
                    Some(table) => Frame::Row { table: table.clone(), cells: Vec::new() },
                    None => Frame::Element { tag, text: String::new(), has_children: false },
                };
                self.stack.push(frame);
            }
            NodeEvent::Text(text) => {
                if let Some(Frame::Element { text: buffer, .. }) = self.stack.last_mut() {
                    buffer.push_str(&text);
                }
            }
            NodeEvent::End(tag) => match self.stack.pop() {
                Some(Frame::Row { table, cells }) => self.emit_row(table, cells),
                Some(Frame::Element { tag: open, text, has_children }) => {
                    if open != tag {
                        tracing::warn!(expected = %open, found = %tag, "mismatched closing element");
                    }
                    if has_children {
                        return;
                    }
                    // Wrapper elements between a leaf and its row are transparent
                    let row = self.stack.iter_mut().rev().find_map(|frame| match frame {
                        Frame::Row { cells, .. } => Some(cells),
                        Frame::Element { .. } => None,
                    });
                    if let Some(cells) = row {
                        cells.push((open, text));
                    }
                }
                None => tracing::warn!(tag = %tag, "closing element without an opening one"),
            },
        }
    }
}

impl<I> Iterator for NodeEvents<I>
where
    I: Iterator<Item = NodeEvent>,
{
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        if !self.started {
            self.started = true;
            return Some(Event::start_container());
        }

        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }
            match self.nodes.next() {
                Some(node) => self.handle(node),
                None => {
                    // Rows left open by a truncated document are still emitted
                    while let Some(frame) = self.stack.pop() {
                        if let Frame::Row { table, cells } = frame {
                            self.emit_row(table, cells);
                        }
                    }
                    self.pending.push_back(Event::end_container());
                    self.finished = true;
                }
            }
        }
    }
}
