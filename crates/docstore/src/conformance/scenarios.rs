//! Collection scenarios shared by every backend.

use chrono::{TimeDelta, TimeZone, Utc};

use crate::codec;
use crate::context::Context;
use crate::core::{Collection, Mods};
use crate::document;
use crate::document::{Document, Value};
use crate::error::{DocstoreResult, ErrorKind};

use super::check::{CheckResult, Checker};

const NONEXISTENT_KEY: &str = "doesNotExist";

fn nonexistent(coll: &Collection) -> Document {
    Document::with_key(coll.key_field(), NONEXISTENT_KEY)
}

/// Builds an empty document holding only `doc`'s key.
fn key_only(coll: &Collection, doc: &Document) -> Document {
    match doc.key(coll.key_field()) {
        Some(key) => Document::with_key(coll.key_field(), key.clone()),
        None => Document::new(),
    }
}

/// Create stores new documents, generates missing keys, and refuses to
/// overwrite.
pub async fn create(coll: &Collection) -> CheckResult {
    let c = Checker::new("create");
    let ctx = Context::background();
    let kf = coll.key_field();

    let mut named = document! { kf => "testCreate1", "b" => true };
    let mut unnamed = document! { "b" => false };

    for doc in [&mut named, &mut unnamed] {
        c.ok(coll.create(&ctx, doc).await, "create")?;
        c.ensure(doc.key(kf).is_some(), || "create left the document without a key".to_string())?;
        let mut got = key_only(coll, doc);
        c.ok(coll.get(&ctx, &mut got).await, "get after create")?;
        c.eq(&got, doc, "document read back after create")?;
    }

    // A document carrying a revision cannot be created.
    c.err_kind(
        coll.create(&ctx, &mut named.clone()).await,
        &[ErrorKind::InvalidArgument],
        "create with revision",
    )?;

    let mut again = named.clone();
    again.clear_revision(coll.revision_field());
    c.err_kind(
        coll.create(&ctx, &mut again).await,
        &[ErrorKind::AlreadyExists],
        "create existing document",
    )?;

    let _ = coll
        .actions()
        .delete(&mut key_only(coll, &named))
        .delete(&mut key_only(coll, &unnamed))
        .run(&ctx)
        .await;
    Ok(())
}

/// Put inserts or replaces.
pub async fn put(coll: &Collection) -> CheckResult {
    let c = Checker::new("put");
    let ctx = Context::background();

    let mut named = document! { coll.key_field() => "testPut1", "b" => true };
    c.ok(coll.put(&ctx, &mut named).await, "put new document")?;
    let mut got = key_only(coll, &named);
    c.ok(coll.get(&ctx, &mut got).await, "get")?;
    c.eq(&got, &named, "document after insert")?;

    c.ok(named.set_field("b", false), "set field")?;
    c.ok(coll.put(&ctx, &mut named).await, "put existing document")?;
    c.ok(coll.get(&ctx, &mut got).await, "get")?;
    c.eq(&got, &named, "document after replace")?;

    drops_missing_fields(coll, c, RevisionWrite::Put).await?;
    revision_field(coll, c, RevisionWrite::Put).await
}

/// Replace requires an existing document.
pub async fn replace(coll: &Collection) -> CheckResult {
    let c = Checker::new("replace");
    let ctx = Context::background();

    let mut doc = document! { coll.key_field() => "testReplace", "s" => "a" };
    c.ok(coll.put(&ctx, &mut doc).await, "put")?;
    c.ok(doc.set_field("s", "b"), "set field")?;
    c.ok(coll.replace(&ctx, &mut doc).await, "replace")?;
    let mut got = key_only(coll, &doc);
    c.ok(coll.get(&ctx, &mut got).await, "get")?;
    c.eq(&got, &doc, "document after replace")?;

    c.err_kind(
        coll.replace(&ctx, &mut nonexistent(coll)).await,
        &[ErrorKind::NotFound],
        "replace nonexistent document",
    )?;

    drops_missing_fields(coll, c, RevisionWrite::Replace).await?;
    revision_field(coll, c, RevisionWrite::Replace).await
}

/// Get populates a key-only document.
pub async fn get(coll: &Collection) -> CheckResult {
    let c = Checker::new("get");
    let ctx = Context::background();

    let mut doc = document! {
        coll.key_field() => "testGet1",
        "s" => "a string",
        "i" => 95i64,
        "f" => 32.3,
    };
    c.ok(coll.put(&ctx, &mut doc).await, "put")?;
    let mut got = key_only(coll, &doc);
    c.ok(coll.get(&ctx, &mut got).await, "get")?;
    c.eq(&got, &doc, "document read back")?;

    c.err_kind(
        coll.get(&ctx, &mut nonexistent(coll)).await,
        &[ErrorKind::NotFound],
        "get nonexistent document",
    )
}

/// Get with field paths loads only those paths, plus key and revision.
pub async fn get_projection(coll: &Collection) -> CheckResult {
    let c = Checker::new("get_projection");
    let ctx = Context::background();
    let kf = coll.key_field();

    let mut nested = document::MapDocument::new();
    nested.insert("c", Value::Int(2));
    nested.insert("d", Value::Int(3));
    let mut doc = document! {
        kf => "testGetProjection",
        "a" => 1,
        "b" => Value::Map(nested.into_fields()),
    };
    c.ok(coll.put(&ctx, &mut doc).await, "put")?;

    let mut got = key_only(coll, &doc);
    c.ok(coll.get_fields(&ctx, &mut got, &["b.c"]).await, "get with field paths")?;
    c.eq(&c.ok(got.get_field("a"), "read a")?, &None, "unselected field")?;
    c.eq(
        &c.ok(got.get_field("b.c"), "read b.c")?,
        &Some(&Value::Int(2)),
        "selected nested field",
    )?;
    c.eq(&c.ok(got.get_field("b.d"), "read b.d")?, &None, "unselected nested field")?;
    c.eq(&got.key(kf), &doc.key(kf), "key")?;
    c.eq(
        &got.revision(coll.revision_field()),
        &doc.revision(coll.revision_field()),
        "revision",
    )
}

/// Delete removes documents, is idempotent without a revision, and checks a
/// revision when given one.
pub async fn delete(coll: &Collection) -> CheckResult {
    let c = Checker::new("delete");
    let ctx = Context::background();

    let mut doc = document! { coll.key_field() => "testDelete" };
    let mut doomed = doc.clone();
    if let Err(e) = coll.actions().put(&mut doc).delete(&mut doomed).run(&ctx).await {
        return Err(c.fail(format!("after {} successful actions: {}", e.succeeded(), e.source)));
    }
    c.err_kind(
        coll.get(&ctx, &mut key_only(coll, &doc)).await,
        &[ErrorKind::NotFound],
        "get deleted document",
    )?;
    c.ok(coll.delete(&ctx, &mut nonexistent(coll)).await, "delete nonexistent document")?;

    // A stale revision blocks the delete.
    doc.clear_revision(coll.revision_field());
    let mut got = key_only(coll, &doc);
    if let Err(e) = coll.actions().put(&mut doc).get(&mut got).run(&ctx).await {
        return Err(c.fail(format!("put then get: {}", e)));
    }
    c.ok(doc.set_field("x", "y"), "set field")?;
    c.ok(coll.put(&ctx, &mut doc).await, "put")?;
    c.err_kind(
        coll.delete(&ctx, &mut got).await,
        &[ErrorKind::FailedPrecondition],
        "delete with stale revision",
    )?;

    // A revision for a missing document is NotFound.
    let mut ghost = nonexistent(coll);
    let revision = got
        .revision(coll.revision_field())
        .cloned()
        .unwrap_or(Value::Int(1));
    ghost.set_revision(coll.revision_field(), revision);
    c.err_kind(
        coll.delete(&ctx, &mut ghost).await,
        &[ErrorKind::NotFound],
        "delete missing document with revision",
    )
}

/// Update changes only the named fields.
pub async fn update(coll: &Collection) -> CheckResult {
    let c = Checker::new("update");
    let ctx = Context::background();
    let kf = coll.key_field();
    let rf = coll.revision_field();

    let mut doc = document! { kf => "testUpdate", "a" => "A", "b" => "B" };
    c.ok(coll.put(&ctx, &mut doc).await, "put")?;

    let mut got = key_only(coll, &doc);
    let mods = Mods::new().set("a", "X").unset("b").set("c", "C");
    if let Err(e) = coll.actions().update(&mut doc, mods).get(&mut got).run(&ctx).await {
        return Err(c.fail(format!("update then get: {}", e)));
    }
    let revision = got.revision(rf).cloned().unwrap_or_default();
    let want = document! { kf => "testUpdate", rf => revision.clone(), "a" => "X", "c" => "C" };
    c.eq(&got, &want, "document after update")?;
    c.eq(&doc.revision(rf), &Some(&revision), "revision written back by update")?;

    // Empty mods change nothing but the revision.
    c.ok(coll.update(&ctx, &mut doc, Mods::new()).await, "update with no mods")?;
    let mut after = key_only(coll, &doc);
    c.ok(coll.get(&ctx, &mut after).await, "get")?;
    c.ensure(after.revision(rf) != Some(&revision), || {
        "update with no mods kept the old revision".to_string()
    })?;
    after.set_revision(rf, revision.clone());
    c.eq(&after, &want, "document after empty update")?;

    c.err_kind(
        coll.update(&ctx, &mut nonexistent(coll), Mods::new().set("x", "y")).await,
        &[ErrorKind::NotFound],
        "update nonexistent document",
    )?;

    revision_field(coll, c, RevisionWrite::Update).await
}

#[derive(Debug, Clone, Copy)]
enum RevisionWrite {
    Put,
    Replace,
    Update,
}

impl RevisionWrite {
    async fn write(
        self,
        coll: &Collection,
        ctx: &Context,
        doc: &mut Document,
    ) -> DocstoreResult<()> {
        match self {
            RevisionWrite::Put => coll.put(ctx, doc).await,
            RevisionWrite::Replace => coll.replace(ctx, doc).await,
            RevisionWrite::Update => coll.update(ctx, doc, Mods::new().set("s", "c")).await,
        }
    }
}

/// A full write removes stored fields the new document does not have.
async fn drops_missing_fields(coll: &Collection, c: Checker, write: RevisionWrite) -> CheckResult {
    let ctx = Context::background();
    let kf = coll.key_field();

    let mut wide = document! { kf => "testFullWrite", "x" => 1i64, "y" => 2i64 };
    c.ok(coll.put(&ctx, &mut wide).await, "full write: put")?;

    let mut narrow = document! { kf => "testFullWrite", "x" => 3i64 };
    c.ok(write.write(coll, &ctx, &mut narrow).await, "full write: write fewer fields")?;

    let mut got = key_only(coll, &narrow);
    c.ok(coll.get(&ctx, &mut got).await, "full write: get")?;
    c.eq(
        &c.ok(got.get_field("x"), "full write: read x")?.cloned(),
        &Some(Value::Int(3)),
        "full write: x",
    )?;
    let y = c.ok(got.get_field("y"), "full write: read y")?;
    c.ensure(y.is_none(), || format!("full write: y should be gone, found {:?}", y))
}

/// A write with a current revision succeeds; repeating it with the now
/// stale revision fails.
async fn revision_field(coll: &Collection, c: Checker, write: RevisionWrite) -> CheckResult {
    let ctx = Context::background();
    let rf = coll.revision_field();

    let mut doc = document! { coll.key_field() => "testRevisionField", "s" => "a" };
    c.ok(coll.put(&ctx, &mut doc).await, "revision: put")?;
    let mut got = key_only(coll, &doc);
    c.ok(coll.get(&ctx, &mut got).await, "revision: get")?;
    c.ensure(got.revision(rf).is_some_and(|r| !r.is_null()), || {
        "revision: missing revision field".to_string()
    })?;

    c.ok(got.set_field("s", "b"), "revision: set field")?;
    let mut stale = got.clone();
    c.ok(write.write(coll, &ctx, &mut got).await, "revision: write with current revision")?;
    c.err_kind(
        write.write(coll, &ctx, &mut stale).await,
        &[ErrorKind::FailedPrecondition, ErrorKind::NotFound],
        "revision: write with old revision",
    )
}

/// Every integer width reads back as a 64-bit signed integer; other
/// scalars keep their type.
pub async fn data(coll: &Collection) -> CheckResult {
    let c = Checker::new("data");
    let ctx = Context::background();
    let kf = coll.key_field();
    let milli_time = Utc
        .with_ymd_and_hms(2019, 3, 27, 0, 0, 0)
        .single()
        .map(|t| t + TimeDelta::milliseconds(5))
        .ok_or_else(|| c.fail("invalid test time"))?;

    let cases: Vec<(&str, Result<Value, crate::error::CodecError>, Value)> = vec![
        ("isize", codec::encode(&-1isize), Value::Int(-1)),
        ("i8", codec::encode(&-8i8), Value::Int(-8)),
        ("i16", codec::encode(&-16i16), Value::Int(-16)),
        ("i32", codec::encode(&-32i32), Value::Int(-32)),
        ("i64", codec::encode(&-64i64), Value::Int(-64)),
        ("usize", codec::encode(&1usize), Value::Int(1)),
        ("u8", codec::encode(&8u8), Value::Int(8)),
        ("u16", codec::encode(&16u16), Value::Int(16)),
        ("u32", codec::encode(&32u32), Value::Int(32)),
        ("u64", codec::encode(&64u64), Value::Int(64)),
        ("f32", codec::encode(&3.5f32), Value::Float(3.5)),
        ("bytes", Ok(Value::Bytes(vec![0, 1, 2])), Value::Bytes(vec![0, 1, 2])),
        ("time", Ok(Value::Time(milli_time)), Value::Time(milli_time)),
    ];

    for (label, input, want) in cases {
        let input = c.ok(input.map_err(Into::into), label)?;
        let mut doc = document! { kf => "testData", "val" => input };
        let mut got = key_only(coll, &doc);
        if let Err(e) = coll.actions().put(&mut doc).get(&mut got).run(&ctx).await {
            return Err(c.fail(format!("{}: {}", label, e)));
        }
        c.eq(&got.len(), &3, &format!("{}: field count of {}", label, got))?;
        c.eq(&c.ok(got.get_field("val"), label)?, &Some(&want), label)?;
    }
    Ok(())
}

/// Actions in a batch run in order and stop at the first failure.
pub async fn batch_ordering(coll: &Collection) -> CheckResult {
    let c = Checker::new("batch_ordering");
    let ctx = Context::background();
    let kf = coll.key_field();

    let mut doc = document! { kf => "testBatch1", "n" => 1 };
    let mut got = key_only(coll, &doc);
    let done = coll
        .actions()
        .put(&mut doc)
        .get(&mut got)
        .run(&ctx)
        .await
        .map_err(|e| c.fail(format!("put then get: {}", e)))?;
    c.eq(&done, &2, "actions completed")?;
    c.eq(&got, &doc, "get sees the earlier put")?;

    let mut first = document! { kf => "testBatch2" };
    let mut missing = nonexistent(coll);
    let mut last = document! { kf => "testBatch3" };
    match coll
        .actions()
        .put(&mut first)
        .replace(&mut missing)
        .put(&mut last)
        .run(&ctx)
        .await
    {
        Ok(n) => return Err(c.fail(format!("batch with failing action succeeded ({} actions)", n))),
        Err(e) => {
            c.eq(&e.index, &1, "failed action index")?;
            c.eq(&e.kind(), &ErrorKind::NotFound, "failed action kind")?;
        }
    }
    c.ok(coll.get(&ctx, &mut key_only(coll, &first)).await, "action before the failure")?;
    c.err_kind(
        coll.get(&ctx, &mut key_only(coll, &last)).await,
        &[ErrorKind::NotFound],
        "action after the failure",
    )
}

/// A canceled or expired context fails without touching the collection.
pub async fn cancellation(coll: &Collection) -> CheckResult {
    let c = Checker::new("cancellation");
    let kf = coll.key_field();

    let canceled = Context::background();
    canceled.cancel();
    let mut doc = document! { kf => "testCancel", "n" => 1 };
    c.err_kind(
        coll.put(&canceled, &mut doc).await,
        &[ErrorKind::Canceled],
        "put with canceled context",
    )?;

    let expired = Context::background().with_deadline(std::time::Instant::now());
    c.err_kind(
        coll.put(&expired, &mut doc).await,
        &[ErrorKind::DeadlineExceeded],
        "put with expired context",
    )?;

    c.err_kind(
        coll.get(&Context::background(), &mut key_only(coll, &doc)).await,
        &[ErrorKind::NotFound],
        "document written with a failed context",
    )
}
