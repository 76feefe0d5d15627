use image::ImageFormat;
use serde_json::json;

use crate::common::{MAX_BLOB_SIZE, TestApp, avatar_id, png, routes, test_image};

mod avatar_id_validation {
    use super::*;

    #[tokio::test]
    async fn malformed_ids_are_rejected_before_any_work() {
        let app = TestApp::spawn().await;

        for id in ["abc", "zz41d8cd98f00b204e9800998ecf842", "d41d8cd98f00b204e9800998ecf8427e00"] {
            let res = app.get(&routes::thumb(id)).await;
            assert_eq!(res.status, 400, "{id}");
            assert_eq!(res.body["code"], "VALIDATION_ERROR");
            assert_eq!(res.body["message"], "\"Id\" must be MD5 hash string");
        }

        let res = app.upload(&routes::thumb("nope"), "a.png", png(8, 8), None).await;
        assert_eq!(res.status, 400);
        assert_eq!(app.blob_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let app = TestApp::spawn().await;
        let id = avatar_id(1);

        assert_eq!(app.get(&routes::thumb(&id)).await.status, 404);
        assert_eq!(app.get(&routes::raw(&id)).await.status, 404);
        assert_eq!(app.delete(&routes::thumb(&id)).await.status, 404);

        let res = app
            .put_json(&routes::thumb(&id), &json!({ "mask": [0, 0, 1, 1] }))
            .await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod avatar_upload {
    use super::*;

    #[tokio::test]
    async fn upload_without_mask_serves_the_same_bytes_twice() {
        let app = TestApp::spawn().await;
        let id = avatar_id(2);
        let upload = png(64, 48);

        let res = app.upload(&routes::thumb(&id), "me.png", upload.clone(), None).await;
        assert_eq!(res.status, 201);
        assert_eq!(res.body["id"], id.as_str());
        assert_eq!(res.body["url_thumb"], format!("api/v1/file/{id}"));
        assert_eq!(res.body["url_origin"], format!("api/v1/file/{id}/raw"));
        assert_eq!(app.blob_count().await, 1);

        let thumb = app.get(&routes::thumb(&id)).await;
        let raw = app.get(&routes::raw(&id)).await;
        assert_eq!(thumb.status, 200);
        assert_eq!(thumb.bytes, upload);
        assert_eq!(raw.bytes, upload);
        assert_eq!(thumb.header("content-type"), Some("image/png"));
        assert_eq!(
            thumb.header("content-length"),
            Some(upload.len().to_string().as_str())
        );
        assert_eq!(thumb.header("etag"), raw.header("etag"));
    }

    #[tokio::test]
    async fn upload_with_mask_crops_the_thumbnail() {
        let app = TestApp::spawn().await;
        let id = avatar_id(3);
        let config = json!({ "mask": [70, 15, 250, 130] });

        let res = app
            .upload(&routes::thumb(&id), "me.png", png(300, 200), Some(&config))
            .await;
        assert_eq!(res.status, 201, "{}", res.body);
        assert_eq!(app.blob_count().await, 2);

        assert_eq!(app.get(&routes::thumb(&id)).await.image_dimensions(), (180, 115));
        assert_eq!(app.get(&routes::raw(&id)).await.image_dimensions(), (300, 200));
    }

    #[tokio::test]
    async fn second_upload_conflicts() {
        let app = TestApp::spawn().await;
        let id = avatar_id(4);

        let first = app.upload(&routes::thumb(&id), "a.png", png(8, 8), None).await;
        assert_eq!(first.status, 201);

        let second = app.upload(&routes::thumb(&id), "b.png", png(9, 9), None).await;
        assert_eq!(second.status, 409);
        assert_eq!(second.body["code"], "CONFLICT");
        assert_eq!(app.blob_count().await, 1);
        assert_eq!(app.get(&routes::thumb(&id)).await.image_dimensions(), (8, 8));
    }

    #[tokio::test]
    async fn jpeg_gif_and_bmp_keep_their_container() {
        let app = TestApp::spawn().await;
        let config = json!({ "mask": [2, 2, 12, 10] });

        for (seed, format, mime) in [
            (10, ImageFormat::Jpeg, "image/jpeg"),
            (11, ImageFormat::Gif, "image/gif"),
            (12, ImageFormat::Bmp, "image/bmp"),
        ] {
            let id = avatar_id(seed);
            let res = app
                .upload(&routes::thumb(&id), "a", test_image(20, 20, format), Some(&config))
                .await;
            assert_eq!(res.status, 201, "{mime}: {}", res.body);

            let thumb = app.get(&routes::thumb(&id)).await;
            assert_eq!(thumb.header("content-type"), Some(mime));
            assert_eq!(
                image::guess_format(&thumb.bytes).unwrap(),
                format,
                "{mime}"
            );
            assert_eq!(thumb.image_dimensions(), (10, 8));
        }
    }

    #[tokio::test]
    async fn rejected_uploads_store_nothing() {
        let app = TestApp::spawn().await;
        let id = avatar_id(5);

        let res = app
            .upload(&routes::thumb(&id), "a.txt", b"hello, not an image".to_vec(), None)
            .await;
        assert_eq!(res.status, 415);
        assert_eq!(res.body["code"], "UNSUPPORTED_MEDIA_TYPE");

        let res = app
            .upload(
                &routes::thumb(&id),
                "a.png",
                png(50, 50),
                Some(&json!({ "mask": [0, 0, 60, 10] })),
            )
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");

        let res = app
            .upload(
                &routes::thumb(&id),
                "a.png",
                png(50, 50),
                Some(&json!({ "mask": [0, 0, 10] })),
            )
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["message"], "mask must contain exactly 4 integers");

        let mut corrupt = png(50, 50);
        corrupt.truncate(60);
        let res = app
            .upload(
                &routes::thumb(&id),
                "a.png",
                corrupt,
                Some(&json!({ "mask": [0, 0, 10, 10] })),
            )
            .await;
        assert_eq!(res.status, 422);
        assert_eq!(res.body["code"], "INVALID_IMAGE");

        assert_eq!(app.blob_count().await, 0);
        assert!(app.records.is_empty());
        assert_eq!(app.get(&routes::thumb(&id)).await.status, 404);
    }

    #[tokio::test]
    async fn oversized_uploads_are_refused() {
        let app = TestApp::spawn().await;
        let id = avatar_id(6);
        let too_big = vec![0u8; MAX_BLOB_SIZE as usize + 1];

        let res = app.upload(&routes::thumb(&id), "big.png", too_big, None).await;
        assert_eq!(res.status, 413);
        assert_eq!(app.blob_count().await, 0);
    }

    #[tokio::test]
    async fn missing_file_part_is_a_validation_error() {
        let app = TestApp::spawn().await;
        let form = reqwest::multipart::Form::new().text("config", "{}");
        let res = app
            .client
            .post(format!("http://{}{}", app.addr, routes::thumb(&avatar_id(7))))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 400);
    }
}

mod avatar_mask {
    use super::*;

    #[tokio::test]
    async fn mask_change_recrops_without_touching_the_original() {
        let app = TestApp::spawn().await;
        let id = avatar_id(20);
        app.upload(
            &routes::thumb(&id),
            "me.png",
            png(300, 200),
            Some(&json!({ "mask": [70, 15, 250, 130] })),
        )
        .await;
        let original = app.get(&routes::raw(&id)).await.bytes;

        let res = app
            .put_json(&routes::thumb(&id), &json!({ "mask": [10, 10, 20, 20] }))
            .await;
        assert_eq!(res.status, 200, "{}", res.body);
        assert_eq!(res.body["id"], id.as_str());

        assert_eq!(app.get(&routes::thumb(&id)).await.image_dimensions(), (10, 10));
        assert_eq!(app.get(&routes::raw(&id)).await.bytes, original);
        assert_eq!(app.blob_count().await, 2);
    }

    #[tokio::test]
    async fn mask_arity_is_enforced() {
        let app = TestApp::spawn().await;
        let id = avatar_id(21);
        app.upload(&routes::thumb(&id), "a.png", png(40, 40), None).await;

        for mask in [json!([]), json!([1, 2, 3]), json!([1, 2, 3, 4, 5])] {
            let res = app.put_json(&routes::thumb(&id), &json!({ "mask": mask })).await;
            assert_eq!(res.status, 400);
            assert_eq!(res.body["message"], "mask must contain exactly 4 integers");
        }

        let res = app.put_json(&routes::thumb(&id), &json!({})).await;
        assert_eq!(res.status, 400);

        let res = app
            .put_json(&routes::thumb(&id), &json!({ "mask": "0,0,1,1" }))
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");

        assert_eq!(app.blob_count().await, 1);
    }
}

mod avatar_replace {
    use super::*;

    #[tokio::test]
    async fn replace_swaps_both_images() {
        let app = TestApp::spawn().await;
        let id = avatar_id(30);
        app.upload(
            &routes::thumb(&id),
            "old.png",
            png(40, 40),
            Some(&json!({ "mask": [0, 0, 20, 20] })),
        )
        .await;

        let upload = png(24, 16);
        let res = app.replace(&routes::raw(&id), "new.png", upload.clone(), None).await;
        assert_eq!(res.status, 200, "{}", res.body);

        assert_eq!(app.blob_count().await, 1);
        assert_eq!(app.get(&routes::raw(&id)).await.bytes, upload);
        assert_eq!(app.get(&routes::thumb(&id)).await.bytes, upload);
    }

    #[tokio::test]
    async fn replace_requires_an_existing_avatar() {
        let app = TestApp::spawn().await;
        let res = app
            .replace(&routes::raw(&avatar_id(31)), "a.png", png(4, 4), None)
            .await;
        assert_eq!(res.status, 404);
        assert_eq!(app.blob_count().await, 0);
    }
}

mod avatar_read {
    use super::*;

    #[tokio::test]
    async fn etag_allows_conditional_requests() {
        let app = TestApp::spawn().await;
        let id = avatar_id(40);
        app.upload(&routes::thumb(&id), "a.png", png(16, 16), None).await;

        let first = app.get(&routes::thumb(&id)).await;
        let etag = first.header("etag").expect("missing ETag").to_string();
        assert!(etag.starts_with('"') && etag.ends_with('"'));

        let cached = app.get_if_none_match(&routes::thumb(&id), &etag).await;
        assert_eq!(cached.status, 304);
        assert!(cached.bytes.is_empty());

        let listed = app
            .get_if_none_match(&routes::thumb(&id), &format!("\"other\", W/{etag}"))
            .await;
        assert_eq!(listed.status, 304);

        let stale = app.get_if_none_match(&routes::thumb(&id), "\"other\"").await;
        assert_eq!(stale.status, 200);
        assert_eq!(stale.bytes, first.bytes);
    }

    #[tokio::test]
    async fn resized_reads() {
        let app = TestApp::spawn().await;
        let id = avatar_id(41);
        app.upload(&routes::thumb(&id), "a.png", png(300, 200), None).await;

        let exact = app.get(&format!("{}?w=30&h=30", routes::raw(&id))).await;
        assert_eq!(exact.status, 200);
        assert_eq!(exact.header("content-type"), Some("image/png"));
        assert!(exact.header("etag").is_none());
        assert_eq!(exact.image_dimensions(), (30, 30));

        let fit = app.get(&format!("{}?s=150", routes::thumb(&id))).await;
        assert_eq!(fit.image_dimensions(), (150, 100));

        assert_eq!(app.blob_count().await, 1);
        assert_eq!(app.get(&routes::thumb(&id)).await.image_dimensions(), (300, 200));
    }

    #[tokio::test]
    async fn malformed_resize_parameters() {
        let app = TestApp::spawn().await;
        let id = avatar_id(42);
        app.upload(&routes::thumb(&id), "a.png", png(20, 20), None).await;

        let cases = [
            ("w=10", "incorrect query parameters"),
            ("h=10", "incorrect query parameters"),
            ("w=ten&h=10", "\"w\" parameter should be an integer"),
            ("w=10&h=1.5", "\"h\" parameter should be an integer"),
            ("s=big", "\"s\" parameter should be an integer"),
        ];
        for (query, message) in cases {
            let res = app.get(&format!("{}?{query}", routes::thumb(&id))).await;
            assert_eq!(res.status, 400, "{query}");
            assert_eq!(res.body["message"], message, "{query}");
        }

        let res = app.get(&format!("{}?s=0", routes::thumb(&id))).await;
        assert_eq!(res.status, 400);
        let res = app.get(&format!("{}?s=100000", routes::thumb(&id))).await;
        assert_eq!(res.status, 400);
    }
}

mod avatar_delete {
    use super::*;

    #[tokio::test]
    async fn delete_removes_everything() {
        let app = TestApp::spawn().await;
        let id = avatar_id(50);
        app.upload(
            &routes::thumb(&id),
            "a.png",
            png(30, 30),
            Some(&json!({ "mask": [0, 0, 10, 10] })),
        )
        .await;
        assert_eq!(app.blob_count().await, 2);

        let res = app.delete(&routes::thumb(&id)).await;
        assert_eq!(res.status, 204);
        assert!(res.bytes.is_empty());

        assert_eq!(app.blob_count().await, 0);
        assert!(app.records.is_empty());
        assert_eq!(app.get(&routes::thumb(&id)).await.status, 404);
        assert_eq!(app.get(&routes::raw(&id)).await.status, 404);
        assert_eq!(app.delete(&routes::thumb(&id)).await.status, 404);
    }

    #[tokio::test]
    async fn id_can_be_reused_after_delete() {
        let app = TestApp::spawn().await;
        let id = avatar_id(51);
        app.upload(&routes::thumb(&id), "a.png", png(8, 8), None).await;
        app.delete(&routes::thumb(&id)).await;

        let res = app.upload(&routes::thumb(&id), "b.png", png(12, 12), None).await;
        assert_eq!(res.status, 201);
        assert_eq!(app.get(&routes::thumb(&id)).await.image_dimensions(), (12, 12));
    }
}
