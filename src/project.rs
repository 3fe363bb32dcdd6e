use std::path::PathBuf;

/// Bookkeeping for the open document; pixels live in the layer store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Project {
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    /// Fixed by the first imported image; `None` until then.
    pub canvas: Option<(u32, u32)>,
    pub is_dirty: bool,
}

impl Project {
    pub fn new_untitled() -> Self {
        Self::default()
    }

    pub fn from_file(path: PathBuf, canvas: (u32, u32)) -> Self {
        Self {
            path: Some(path),
            canvas: (canvas.0 > 0 && canvas.1 > 0).then_some(canvas),
            is_dirty: false,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Canvas size for the file format; `(0, 0)` before the first import.
    pub fn canvas_or_zero(&self) -> (u32, u32) {
        self.canvas.unwrap_or((0, 0))
    }

    /// Display name: file name, or "Untitled".
    pub fn name(&self) -> String {
        self.path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Untitled".to_string())
    }

    /// Window title, with a `*` while there are unsaved changes.
    pub fn title(&self) -> String {
        let dirty = if self.is_dirty { "*" } else { "" };
        format!("{}{} - NormalMaker", self.name(), dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_tracks_dirty_state() {
        let mut p = Project::from_file(PathBuf::from("/work/rock.nm"), (64, 32));
        assert_eq!(p.title(), "rock.nm - NormalMaker");
        p.mark_dirty();
        assert_eq!(p.title(), "rock.nm* - NormalMaker");
        p.mark_clean();
        assert!(!p.is_dirty);
    }

    #[test]
    fn zero_canvas_is_unset() {
        let p = Project::from_file(PathBuf::from("a.nm"), (0, 0));
        assert_eq!(p.canvas, None);
        assert_eq!(p.canvas_or_zero(), (0, 0));
        assert_eq!(Project::new_untitled().name(), "Untitled");
    }
}
