use super::Listing;
use crate::constants::ROOT_INODE;

/// Current directory of a session with its path and listing cache.
#[derive(Debug, Clone)]
pub struct WorkingDirectory {
    inode: u64,
    components: Vec<String>,
    path: String,
    listing: Option<Vec<Listing>>,
}

impl WorkingDirectory {
    #[must_use]
    pub fn root() -> Self {
        Self {
            inode: ROOT_INODE,
            components: Vec::new(),
            path: "/".to_string(),
            listing: None,
        }
    }

    #[must_use]
    pub const fn inode(&self) -> u64 {
        self.inode
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn enter(&mut self, inode: u64, name: &str) {
        self.inode = inode;
        self.components.push(name.to_string());
        self.refresh_path();
    }

    pub(crate) fn leave(&mut self, parent: u64) {
        self.inode = parent;
        self.components.pop();
        self.refresh_path();
    }

    pub(crate) fn cached(&self) -> Option<&[Listing]> {
        self.listing.as_deref()
    }

    pub(crate) fn cache(&mut self, listing: Vec<Listing>) {
        self.listing = Some(listing);
    }

    pub(crate) fn invalidate(&mut self) {
        self.listing = None;
    }

    fn refresh_path(&mut self) {
        self.path = format!("/{}", self.components.join("/"));
        self.listing = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_tracks_enter_and_leave() {
        let mut cwd = WorkingDirectory::root();
        assert_eq!(cwd.path(), "/");
        cwd.enter(4, "docs");
        cwd.enter(9, "drafts");
        assert_eq!(cwd.path(), "/docs/drafts");
        assert_eq!(cwd.inode(), 9);
        cwd.leave(4);
        assert_eq!(cwd.path(), "/docs");
        cwd.leave(ROOT_INODE);
        assert_eq!(cwd.path(), "/");
    }

    #[test]
    fn moving_drops_listing_cache() {
        let mut cwd = WorkingDirectory::root();
        cwd.cache(Vec::new());
        assert!(cwd.cached().is_some());
        cwd.enter(2, "a");
        assert!(cwd.cached().is_none());
    }
}
