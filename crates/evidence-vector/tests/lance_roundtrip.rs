use evidence_core::filter::{Clause, FilterExpr};
use evidence_core::traits::VectorSearch;
use evidence_vector::{open_db, write_records, EvidenceRecord, LanceGateway};

fn records() -> Vec<EvidenceRecord> {
    vec![
        EvidenceRecord::new("PMID100", "CD19 CAR-T remission rates", vec![1.0, 0.0, 0.0, 0.0])
            .with_meta("target_antigen", "CD19")
            .with_meta("year", "2017"),
        EvidenceRecord::new("PMID200", "CD19 CAR-T long-term follow-up", vec![0.9, 0.1, 0.0, 0.0])
            .with_meta("target_antigen", "CD19")
            .with_meta("year", "2022"),
        EvidenceRecord::new("PMID300", "BCMA CAR-T in myeloma", vec![0.7, 0.7, 0.0, 0.0])
            .with_meta("target_antigen", "BCMA")
            .with_meta("year", "2021"),
        EvidenceRecord::new("PMID400", "unrelated", vec![0.0, 0.0, 1.0, 0.0])
            .with_meta("target_antigen", "GD2")
            .with_meta("year", "2019"),
    ]
}

#[tokio::test]
async fn write_then_search_with_filters() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().to_string();
    let db = open_db(&uri).await?;
    assert_eq!(write_records(&db, "cart_literature", &records(), 4).await?, 4);

    let gateway = LanceGateway::from_connection(db);
    assert_eq!(gateway.table_names().await?, vec!["cart_literature".to_string()]);

    let hits = gateway.search("cart_literature", &[1.0, 0.0, 0.0, 0.0], 3, None).await?;
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "PMID100");
    assert!(hits[0].score > 0.99);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(hits[0].metadata.get("year").map(String::as_str), Some("2017"));
    assert_eq!(hits[0].text, "CD19 CAR-T remission rates");

    let bcma = FilterExpr::eq("target_antigen", "BCMA");
    let hits = gateway.search("cart_literature", &[1.0, 0.0, 0.0, 0.0], 5, Some(&bcma)).await?;
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["PMID300"]);

    let recent_cd19 = FilterExpr::eq("target_antigen", "CD19").and(Clause::Gte { field: "year".into(), value: 2020 });
    let hits = gateway.search("cart_literature", &[1.0, 0.0, 0.0, 0.0], 5, Some(&recent_cd19)).await?;
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["PMID200"]);
    Ok(())
}

#[tokio::test]
async fn appends_to_existing_table_and_rejects_wrong_dims() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let db = open_db(&tmp.path().to_string_lossy()).await?;
    let mut all = records();
    let tail = all.split_off(2);
    write_records(&db, "cart_trials", &all, 4).await?;
    write_records(&db, "cart_trials", &tail, 4).await?;
    assert_eq!(db.open_table("cart_trials").execute().await?.count_rows(None).await?, 4);

    let bad = vec![EvidenceRecord::new("X", "short", vec![1.0, 0.0])];
    assert!(write_records(&db, "cart_trials", &bad, 4).await.is_err());
    Ok(())
}

#[tokio::test]
async fn missing_table_is_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let gateway = LanceGateway::connect(&tmp.path().to_string_lossy()).await?;
    assert!(gateway.search("cart_missing", &[1.0, 0.0, 0.0, 0.0], 3, None).await.is_err());
    Ok(())
}
