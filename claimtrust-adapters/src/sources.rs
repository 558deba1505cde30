//! Lookups against sources shared by several adapters

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use urlencoding::encode;

use claimtrust_core::value::{as_number, as_string};
use claimtrust_net::{FetchError, HttpClient, Lookup};

const UNIPROT: &str = "https://rest.uniprot.org/uniprotkb";
const EUTILS: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const ENSEMBL: &str = "https://rest.ensembl.org";
const RCSB: &str = "https://data.rcsb.org/rest/v1/core/entry";
const PUBCHEM: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug/compound";

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniprotEntry {
    pub primary_accession: String,
    #[serde(default)]
    pub sequence: Option<UniprotSequence>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UniprotSequence {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub length: usize,
}

impl UniprotEntry {
    pub fn length(&self) -> Option<usize> {
        self.sequence.as_ref().map(|s| s.length).filter(|l| *l > 0)
    }
}

pub async fn uniprot_entry(http: &HttpClient, accession: &str) -> Lookup<UniprotEntry> {
    let url = format!("{}/{}.json", UNIPROT, encode(accession));
    http.lookup_json(&url).await?.map(decode).transpose()
}

/// NCBI esummary record for `id`; an empty result set is "not found"
pub async fn ncbi_esummary(http: &HttpClient, db: &str, id: &str) -> Lookup<Value> {
    let url = format!(
        "{}/esummary.fcgi?db={}&id={}&retmode=json",
        EUTILS,
        encode(db),
        encode(id)
    );
    let Some(body) = http.lookup_json(&url).await? else {
        return Ok(None);
    };
    let result = &body["result"];
    let uid = result["uids"]
        .as_array()
        .and_then(|uids| uids.first())
        .and_then(as_string);
    Ok(uid
        .map(|uid| result[uid.as_str()].clone())
        .filter(|record| record.is_object() && record.get("error").is_none()))
}

/// Number of records an NCBI esearch query matches
pub async fn ncbi_esearch_count(http: &HttpClient, db: &str, term: &str) -> Result<u64, FetchError> {
    let url = format!(
        "{}/esearch.fcgi?db={}&term={}&retmode=json",
        EUTILS,
        encode(db),
        encode(term)
    );
    let body = http.get_json(&url).await?;
    body["esearchresult"]["count"]
        .as_str()
        .and_then(|c| c.parse().ok())
        .ok_or_else(|| FetchError::Decode("esearch response has no count".to_string()))
}

pub async fn ensembl_lookup_id(http: &HttpClient, id: &str) -> Lookup<Value> {
    let url = format!("{}/lookup/id/{}?content-type=application/json", ENSEMBL, encode(id));
    http.lookup_json(&url).await
}

pub async fn ensembl_lookup_symbol(http: &HttpClient, species: &str, symbol: &str) -> Lookup<Value> {
    let url = format!(
        "{}/lookup/symbol/{}/{}?content-type=application/json",
        ENSEMBL,
        encode(species),
        encode(symbol)
    );
    http.lookup_json(&url).await
}

pub async fn rcsb_entry(http: &HttpClient, pdb_id: &str) -> Lookup<Value> {
    let url = format!("{}/{}", RCSB, encode(&pdb_id.to_ascii_uppercase()));
    http.lookup_json(&url).await
}

/// Identity and formula properties of a PubChem compound
#[derive(Debug, Clone, PartialEq)]
pub struct PubchemCompound {
    pub cid: u64,
    pub molecular_formula: Option<String>,
    pub monoisotopic_mass: Option<f64>,
}

fn first_compound(body: &Value) -> Option<PubchemCompound> {
    let props = body["PropertyTable"]["Properties"].as_array()?.first()?;
    Some(PubchemCompound {
        cid: props["CID"].as_u64()?,
        molecular_formula: props.get("MolecularFormula").and_then(as_string),
        // PUG REST renders masses as strings
        monoisotopic_mass: props.get("MonoisotopicMass").and_then(as_number),
    })
}

async fn pubchem_properties(http: &HttpClient, namespace: &str, key: &str) -> Lookup<PubchemCompound> {
    let url = format!(
        "{}/{}/{}/property/MolecularFormula,MonoisotopicMass/JSON",
        PUBCHEM,
        namespace,
        encode(key)
    );
    match http.lookup_json(&url).await? {
        Some(body) => first_compound(&body)
            .map(Some)
            .ok_or_else(|| FetchError::Decode("PubChem response has no properties".to_string())),
        None => Ok(None),
    }
}

pub async fn pubchem_by_name(http: &HttpClient, name: &str) -> Lookup<PubchemCompound> {
    pubchem_properties(http, "name", name).await
}

pub async fn pubchem_by_cid(http: &HttpClient, cid: &str) -> Lookup<PubchemCompound> {
    pubchem_properties(http, "cid", cid).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimtrust_net::{StubFetcher, StubReply};
    use serde_json::json;
    use std::sync::Arc;

    fn client(stub: StubFetcher) -> HttpClient {
        HttpClient::new(Arc::new(stub))
    }

    #[tokio::test]
    async fn test_uniprot_entry_decodes_length() {
        let http = client(StubFetcher::new().route(
            "uniprotkb/P69905",
            StubReply::json(json!({"primaryAccession": "P69905", "sequence": {"value": "MVLS", "length": 142}})),
        ));
        let entry = uniprot_entry(&http, "P69905").await.unwrap().unwrap();
        assert_eq!(entry.primary_accession, "P69905");
        assert_eq!(entry.length(), Some(142));
    }

    #[tokio::test]
    async fn test_esummary_error_record_is_absent() {
        let http = client(StubFetcher::new().route(
            "esummary.fcgi",
            StubReply::json(json!({"result": {"uids": ["0"], "0": {"error": "cannot get document summary"}}})),
        ));
        assert_eq!(ncbi_esummary(&http, "snp", "0").await, Ok(None));
    }

    #[tokio::test]
    async fn test_esearch_count() {
        let http = client(StubFetcher::new().route(
            "esearch.fcgi",
            StubReply::json(json!({"esearchresult": {"count": "3"}})),
        ));
        assert_eq!(ncbi_esearch_count(&http, "gds", "GSE12345").await, Ok(3));
    }

    #[tokio::test]
    async fn test_pubchem_mass_as_string() {
        let http = client(StubFetcher::new().route(
            "compound/name/caffeine",
            StubReply::json(json!({"PropertyTable": {"Properties": [
                {"CID": 2519, "MolecularFormula": "C8H10N4O2", "MonoisotopicMass": "194.08037557"}
            ]}})),
        ));
        let compound = pubchem_by_name(&http, "caffeine").await.unwrap().unwrap();
        assert_eq!(compound.cid, 2519);
        assert_eq!(compound.molecular_formula.as_deref(), Some("C8H10N4O2"));
        assert!((compound.monoisotopic_mass.unwrap() - 194.0804).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_rcsb_not_found() {
        let http = client(StubFetcher::new().route("core/entry/9ZZZ", StubReply::status(404)));
        assert_eq!(rcsb_entry(&http, "9zzz").await, Ok(None));
    }
}
