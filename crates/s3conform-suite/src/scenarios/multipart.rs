//! Multipart uploads and part-wise reads.

use futures::future::{BoxFuture, FutureExt};

use s3conform_core::case::{expect_eq, expect_ne, expect_success};
use s3conform_core::storage::{CompletedPart, GetOptions, HeadOptions};
use s3conform_core::{CaseContext, CaseResult, FailureReason, ObjectKey, Quirk, Scenario};

use super::scenario;

const SUITE: &str = "multipart";
const MB: usize = 1024 * 1024;

/// Every part but the last must be at least 5 MiB.
const PART_SIZES: [usize; 3] = [5 * MB, 7 * MB, 3 * MB];

pub(crate) fn scenarios() -> Vec<Scenario> {
    vec![Scenario {
        sensitive_to: &[
            Quirk::GetObjectPartNotSupported,
            Quirk::GetObjectPartcountNotSupported,
            Quirk::MultipartSizesNotKept,
        ],
        ..scenario(SUITE, "retrieves_original_parts", retrieves_original_parts)
    }]
}

async fn upload(ctx: &CaseContext, key: &ObjectKey) -> CaseResult {
    let created = ctx.client().create_multipart_upload(key).await?;
    expect_success("CreateMultipartUpload", &created)?;

    let mut completed = Vec::with_capacity(PART_SIZES.len());
    for (i, size) in PART_SIZES.iter().enumerate() {
        let part_number = i as u32 + 1;
        let body = vec![0u8; *size];
        let output = ctx
            .client()
            .upload_part(key, &created.upload_id, part_number, &body)
            .await?;
        let operation = format!("UploadPart {}", part_number);
        expect_success(&operation, &output)?;
        let etag = output.etag.ok_or_else(|| FailureReason::MalformedHeader {
            operation,
            header: "<absent ETag>".to_string(),
        })?;
        completed.push(CompletedPart { part_number, etag });
    }

    let output = ctx
        .client()
        .complete_multipart_upload(key, &created.upload_id, completed)
        .await?;
    expect_success("CompleteMultipartUpload", &output)
}

fn retrieves_original_parts(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let key = ObjectKey::from("multiparted");
        upload(ctx, &key).await?;
        let uploaded_total: u64 = PART_SIZES.iter().map(|s| *s as u64).sum();

        let head = ctx
            .client()
            .head_object(
                &key,
                HeadOptions {
                    part_number: Some(1),
                    ..Default::default()
                },
            )
            .await?;
        expect_success("HeadObject partNumber=1", &head)?;

        let part_reads = !ctx.has_quirk(Quirk::GetObjectPartNotSupported)?;
        let count_unsupported = ctx.has_quirk(Quirk::GetObjectPartcountNotSupported)?;
        let sizes_not_kept = ctx.has_quirk(Quirk::MultipartSizesNotKept)?;

        let mut parts_count = None;
        if part_reads {
            parts_count = head.parts_count;
            expect_eq(
                "HeadObject PartsCount present",
                !count_unsupported,
                parts_count.is_some(),
            )?;
            if let (Some(count), false) = (parts_count, sizes_not_kept) {
                expect_eq("HeadObject PartsCount", PART_SIZES.len() as u32, count)?;
            }
        }

        let mut received_total = 0;
        match parts_count {
            Some(count) => {
                for part_number in 1..=count {
                    let output = ctx
                        .client()
                        .get_object(
                            &key,
                            GetOptions {
                                part_number: Some(part_number),
                                ..Default::default()
                            },
                        )
                        .await?;
                    let operation = format!("GetObject partNumber={}", part_number);
                    expect_success(&operation, &output)?;
                    received_total += output.content_length;

                    let uploaded = PART_SIZES
                        .get(part_number as usize - 1)
                        .map(|s| *s as u64);
                    let received = Some(output.content_length);
                    if sizes_not_kept {
                        expect_ne(&format!("{} size", operation), uploaded, received)?;
                    } else {
                        expect_eq(&format!("{} size", operation), uploaded, received)?;
                    }
                }
            }
            None => {
                let output = ctx.client().get_object(&key, GetOptions::default()).await?;
                expect_success("GetObject", &output)?;
                received_total += output.content_length;
            }
        }

        expect_eq("multipart total size", uploaded_total, received_total)
    }
    .boxed()
}
