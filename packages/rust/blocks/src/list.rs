//! List grouping.
//!
//! Consecutive list items of the same kind share one `<ul>`/`<ol>` wrapper.
//! [`ListState`] is a single-slot state machine: either no list is open, or
//! one list of a given kind is. [`ListState::enter`] moves it to the state
//! required by the next block and returns the wrapper tags to emit first.

/// Kind of list wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Bulleted,
    Numbered,
}

impl ListKind {
    pub fn open_tag(self) -> &'static str {
        match self {
            Self::Bulleted => "<ul>",
            Self::Numbered => "<ol>",
        }
    }

    pub fn close_tag(self) -> &'static str {
        match self {
            Self::Bulleted => "</ul>",
            Self::Numbered => "</ol>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListState {
    #[default]
    NoOpenList,
    OpenList(ListKind),
}

impl ListState {
    /// Transition for a block whose list membership is `incoming`
    /// (`None` for a non-list block). Returns the tags to emit before it.
    pub fn enter(&mut self, incoming: Option<ListKind>) -> Vec<&'static str> {
        let mut tags = Vec::new();

        match (*self, incoming) {
            (Self::OpenList(open), Some(next)) if open == next => {}
            (Self::OpenList(open), Some(next)) => {
                tags.push(open.close_tag());
                tags.push(next.open_tag());
                *self = Self::OpenList(next);
            }
            (Self::OpenList(open), None) => {
                tags.push(open.close_tag());
                *self = Self::NoOpenList;
            }
            (Self::NoOpenList, Some(next)) => {
                tags.push(next.open_tag());
                *self = Self::OpenList(next);
            }
            (Self::NoOpenList, None) => {}
        }

        tags
    }

    /// Close whatever list is still open at the end of the block sequence.
    pub fn finish(&mut self) -> Option<&'static str> {
        match std::mem::take(self) {
            Self::OpenList(open) => Some(open.close_tag()),
            Self::NoOpenList => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_on_first_item_and_stays_open() {
        let mut state = ListState::default();
        assert_eq!(state.enter(Some(ListKind::Bulleted)), vec!["<ul>"]);
        assert_eq!(state, ListState::OpenList(ListKind::Bulleted));
        assert!(state.enter(Some(ListKind::Bulleted)).is_empty());
    }

    #[test]
    fn kind_change_closes_then_opens() {
        let mut state = ListState::OpenList(ListKind::Bulleted);
        assert_eq!(state.enter(Some(ListKind::Numbered)), vec!["</ul>", "<ol>"]);
        assert_eq!(state, ListState::OpenList(ListKind::Numbered));
    }

    #[test]
    fn non_list_block_closes() {
        let mut state = ListState::OpenList(ListKind::Numbered);
        assert_eq!(state.enter(None), vec!["</ol>"]);
        assert_eq!(state, ListState::NoOpenList);
        assert!(state.enter(None).is_empty());
    }

    #[test]
    fn finish_closes_open_list_once() {
        let mut state = ListState::OpenList(ListKind::Bulleted);
        assert_eq!(state.finish(), Some("</ul>"));
        assert_eq!(state.finish(), None);
    }
}
