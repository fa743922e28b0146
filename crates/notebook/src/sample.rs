use crate::tree::{NodeStore, TreeError};

const WELCOME: &str = "Welcome to your notebook.\n\n\
Everything here lives inside a single container file. Folders keep your \
chapters in order, and anything you delete waits in the trash until you \
empty it.\n";

const CHAPTER_ONE: &str = "It was a dark and stormy night.\n";

const CHAPTER_TWO: &str = "The storm had passed, but nobody noticed.\n";

/// Builds the starter notebook seeded on first run: a welcome note and a
/// small sample story to poke at.
/// 建立首次啟動時提供的範例筆記本：一則歡迎筆記與可供把玩的小型範例故事。
pub fn sample_notebook() -> Result<NodeStore, TreeError> {
    let mut store = NodeStore::new("Notebook");
    let root = store.root_id();

    let welcome = store.create_file(root, "Welcome")?;
    store.write_content(welcome, WELCOME.as_bytes())?;

    let story = store.create_folder(root, "Sample Story")?;
    store.set_expanded(story, true)?;
    let one = store.create_file(story, "Chapter 1")?;
    store.write_content(one, CHAPTER_ONE.as_bytes())?;
    let two = store.create_file(story, "Chapter 2")?;
    store.write_content(two, CHAPTER_TWO.as_bytes())?;

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container;

    #[test]
    fn sample_notebook_is_a_valid_container() {
        let store = sample_notebook().unwrap();
        let decoded = container::from_json(&container::to_json(&store).unwrap()).unwrap();
        assert_eq!(decoded, store);
    }

    #[test]
    fn sample_notebook_has_the_expected_shape() {
        let store = sample_notebook().unwrap();
        let children = store.children_of(store.root_id()).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(store.name_of(children[0]).unwrap(), "Welcome");
        assert_eq!(store.name_of(children[1]).unwrap(), "Sample Story");
        let chapters = store.children_of(children[1]).unwrap();
        assert_eq!(chapters.len(), 2);
    }
}
