//! Tests for the guide channel mapper

#[cfg(test)]
mod tests {
    use crate::mapper::*;
    use crate::xmltv::{Guide, GuideChannel};

    fn guide(names: &[&str]) -> Guide {
        let mut guide = Guide::new();
        for (i, name) in names.iter().enumerate() {
            guide.add_channel(GuideChannel {
                id: format!("ch{}", i),
                name: name.to_string(),
                icon: None,
            });
        }
        guide
    }

    fn map(pairs: &[(&str, &str)]) -> ChannelMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_map_matches_exact_names_only() {
        let device = guide(&["BBC ONE", "ITV", "Channel 4 HD", "E4"]);
        let external = guide(&["BBC ONE", "Channel 4", "e4"]);

        let default_map = GuideChannelMapper::create_default_map(&device, &external);
        assert_eq!(
            default_map,
            map(&[("BBC ONE", "BBC ONE"), ("ITV", ""), ("Channel 4 HD", ""), ("E4", "")])
        );
    }

    #[test]
    fn test_initialize_writes_and_loads_default_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channel_mappings.xml");

        let mut mapper = GuideChannelMapper::new(&path);
        mapper.initialize(&guide(&["BBC ONE", "ITV"]), &guide(&["BBC ONE", "Channel 4"]));

        assert!(path.exists());
        assert_eq!(mapper.mappings(), &map(&[("BBC ONE", "BBC ONE"), ("ITV", "")]));
        assert_eq!(mapper.external_channel_name("BBC ONE"), "BBC ONE");
        assert_eq!(mapper.external_channel_name("ITV"), "");
    }

    #[test]
    fn test_initialize_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channel_mappings.xml");
        std::fs::write(
            &path,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<xmltvmap>
  <mapping vbox-name="ITV" xmltv-name="ITV1"/>
</xmltvmap>"#,
        )
        .unwrap();

        let mut mapper = GuideChannelMapper::new(&path);
        mapper.initialize(&guide(&["BBC ONE", "ITV"]), &guide(&["BBC ONE", "Channel 4"]));

        // User override honoured without validation against the external guide
        assert_eq!(mapper.external_channel_name("ITV"), "ITV1");
        // Default mapping not merged in once a file exists
        assert_eq!(mapper.external_channel_name("BBC ONE"), "");
        assert_eq!(mapper.mappings().len(), 1);
    }

    #[test]
    fn test_save_then_load_reproduces_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("channel_mappings.xml");
        let original = map(&[
            ("BBC ONE", "BBC One HD"),
            ("ITV", ""),
            ("Tom & Jerry's \"Classics\" <TV>", "Boomerang"),
            ("Ünïcödé", "Unicode"),
            ("", "orphan"),
        ]);

        let mut mapper = GuideChannelMapper::new(&path);
        mapper.save(&original).unwrap();
        mapper.load();

        assert_eq!(mapper.mappings(), &original);
    }

    #[test]
    fn test_load_missing_file_leaves_map_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut mapper = GuideChannelMapper::new(dir.path().join("absent.xml"));
        mapper.load();
        assert!(mapper.mappings().is_empty());
        assert_eq!(mapper.external_channel_name("anything"), "");
    }

    #[test]
    fn test_load_replaces_previous_mappings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channel_mappings.xml");
        let mut mapper = GuideChannelMapper::new(&path);

        mapper.replace(&map(&[("A", "a"), ("B", "b")])).unwrap();
        mapper.replace(&map(&[("C", "c")])).unwrap();

        assert_eq!(mapper.mappings(), &map(&[("C", "c")]));
    }

    #[test]
    fn test_load_duplicates_last_wins_and_tolerates_missing_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channel_mappings.xml");
        std::fs::write(
            &path,
            r#"<xmltvmap>
  <mapping vbox-name="ITV" xmltv-name="ITV1"/>
  <mapping vbox-name="ITV" xmltv-name="ITV1 HD"/>
  <mapping vbox-name="Dave"/>
  <mapping xmltv-name="Nobody"/>
</xmltvmap>"#,
        )
        .unwrap();

        let mut mapper = GuideChannelMapper::new(&path);
        mapper.load();

        assert_eq!(mapper.mappings(), &map(&[("ITV", "ITV1 HD"), ("Dave", "")]));
    }

    #[test]
    fn test_load_truncated_file_keeps_leading_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channel_mappings.xml");
        std::fs::write(
            &path,
            r#"<xmltvmap>
  <mapping vbox-name="BBC ONE" xmltv-name="BBC One"/>
  <mapping vbox-name="ITV" xmltv-name="ITV1"/>
</wrong>"#,
        )
        .unwrap();

        let mut mapper = GuideChannelMapper::new(&path);
        mapper.load();

        assert_eq!(mapper.external_channel_name("BBC ONE"), "BBC One");
        assert_eq!(mapper.external_channel_name("ITV"), "ITV1");
    }

    #[test]
    fn test_unwritable_location_keeps_default_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut mapper = GuideChannelMapper::new(blocker.join("channel_mappings.xml"));
        mapper.initialize(&guide(&["BBC ONE"]), &guide(&["BBC ONE"]));

        assert_eq!(mapper.external_channel_name("BBC ONE"), "BBC ONE");
    }

    #[test]
    fn test_unknown_name_returns_empty() {
        let mapper = GuideChannelMapper::new("/nonexistent/channel_mappings.xml");
        assert_eq!(mapper.external_channel_name("BBC ONE"), "");
        assert_eq!(mapper.external_channel_name(""), "");
    }
}
