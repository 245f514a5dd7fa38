macro_rules! assert_blob_not_found {
    ($blob_store:expr, $container:expr, $key:expr) => {{
        match $blob_store
            .get_blob($container, $key, &lgn_blobstore::GetOptions::new())
            .await
        {
            Ok(_) => panic!("blob `{}/{}` was found", $container, $key),
            Err(lgn_blobstore::Error::NotFound(_)) => {}
            Err(err) => panic!("unexpected error: {}", err),
        };
    }};
}

macro_rules! assert_read_blob {
    ($blob_store:expr, $container:expr, $key:expr, $expected_payload:expr) => {{
        let blob = $blob_store
            .get_blob($container, $key, &lgn_blobstore::GetOptions::new())
            .await
            .expect("failed to read blob");

        assert_eq!(&blob.payload[..], &$expected_payload[..]);

        blob
    }};
}

macro_rules! assert_put_blob {
    ($blob_store:expr, $container:expr, $blob:expr) => {{
        $blob_store
            .put_blob($container, $blob)
            .await
            .expect("failed to put blob")
    }};
}

macro_rules! assert_listed_names {
    ($blob_store:expr, $container:expr, $options:expr, $expected_names:expr) => {{
        let page = $blob_store
            .list($container, &$options)
            .await
            .expect("failed to list container");

        let names: Vec<_> = page.iter().map(|entry| entry.name.as_str()).collect();
        let expected_names: Vec<&str> = $expected_names.to_vec();

        assert_eq!(names, expected_names);

        page
    }};
}

pub(crate) use {assert_blob_not_found, assert_listed_names, assert_put_blob, assert_read_blob};
