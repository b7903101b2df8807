//! Stage specs for the annotation workload.
//!
//! The workload runs three phases in sequence (download, annotate, upload) and
//! each phase reads one opaque argument string built here.

use serde::{Deserialize, Serialize};

use crate::state_machine::Job;

const STAGING_DIR: &str = "/data";
const CACHE_DIR: &str = "/cache";
const OUTPUT_DIR: &str = "/output";
const RESULT_PREFIX: &str = "result";
const DATABASE_PATH: &str = "/db/db";
const MOCK_DATABASE_PATH: &str = "/db/db-mock";

/// Result artifacts produced by the annotation tool, as (name, suffix).
pub const RESULT_ARTIFACTS: [(&str, &str); 9] = [
    ("TSV", "tsv"),
    ("GFF3", "gff3"),
    ("GBFF", "gbff"),
    ("FNA", "fna"),
    ("FAA", "faa"),
    ("JSON", "json"),
    ("EMBL", "embl"),
    ("TSVHypothetical", "hypotheticals.tsv"),
    ("FAAHypothetical", "hypotheticals.faa"),
];

/// Cell envelope of the annotated organism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DermType {
    #[default]
    Unknown,
    Monoderm,
    Diderm,
}

impl DermType {
    fn gram_flag(self) -> &'static str {
        match self {
            DermType::Unknown => "?",
            DermType::Monoderm => "+",
            DermType::Diderm => "-",
        }
    }
}

/// Annotation options chosen by the client when starting a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobConfig {
    pub has_prodigal: bool,
    pub has_replicons: bool,
    pub translation_table: u32,
    pub complete_genome: bool,
    pub keep_contig_headers: bool,
    pub min_contig_length: u32,
    pub derm_type: DermType,
    pub genus: String,
    pub species: String,
    pub strain: String,
    pub plasmid: String,
    pub locus: String,
    pub locus_tag: String,
    pub compliant: bool,
}

/// All three stage specs for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpecs {
    pub download: String,
    pub annotate: String,
    pub upload: String,
}

/// Builds stage specs. Holds the few deployment settings the specs depend on.
#[derive(Debug, Clone)]
pub struct JobSpecBuilder {
    /// Object-storage host passed to the download and upload phases.
    pub endpoint: String,
    pub threads: u32,
    /// Point the annotator at the small mock database (testing/debug runs).
    pub use_mock_database: bool,
}

impl JobSpecBuilder {
    pub fn new(endpoint: impl Into<String>, threads: u32, use_mock_database: bool) -> Self {
        Self {
            endpoint: endpoint.into(),
            threads,
            use_mock_database,
        }
    }

    pub fn build(&self, job: &Job, config: &JobConfig) -> StageSpecs {
        StageSpecs {
            download: self.build_download_spec(job, config.has_prodigal, config.has_replicons),
            annotate: self.build_annotate_spec(job, config),
            upload: self.build_upload_spec(job),
        }
    }

    /// `download -b <buckets> -k <keys> -d <dir> -e <endpoint>`, with the FASTA
    /// first, then the training file, then the replicon table.
    pub fn build_download_spec(
        &self,
        job: &Job,
        has_training_file: bool,
        has_replicons: bool,
    ) -> String {
        let keys = &job.keys;
        let mut inputs = vec![keys.fasta_key.as_str()];
        if has_training_file {
            inputs.push(&keys.prodigal_key);
        }
        if has_replicons {
            inputs.push(&keys.replicon_key);
        }

        let buckets = vec![keys.data_bucket.as_str(); inputs.len()].join(",");
        format!(
            "download -b {buckets} -k {} -d {STAGING_DIR} -e {}",
            inputs.join(","),
            self.endpoint
        )
    }

    pub fn build_annotate_spec(&self, job: &Job, config: &JobConfig) -> String {
        let mut args: Vec<String> = vec![
            format!("--tmp-dir {CACHE_DIR}"),
            format!("--threads {}", self.threads),
            format!("--prefix {RESULT_PREFIX}"),
            format!("-o {OUTPUT_DIR}"),
        ];

        if config.has_prodigal {
            args.push(format!("--prodigal-tf {}", staged_path(&job.keys.prodigal_key)));
        }
        if config.has_replicons {
            args.push(format!("--replicons {}", staged_path(&job.keys.replicon_key)));
        }

        let database = if self.use_mock_database {
            MOCK_DATABASE_PATH
        } else {
            DATABASE_PATH
        };
        args.push(format!("--db {database}"));

        if config.min_contig_length > 1 {
            args.push(format!("--min-contig-length {}", config.min_contig_length));
        }
        if config.complete_genome {
            args.push("--complete".into());
        }
        push_quoted(&mut args, "--locus", &config.locus);
        push_quoted(&mut args, "--locus-tag", &config.locus_tag);
        if config.keep_contig_headers {
            args.push("--keep-contig-headers".into());
        }
        push_quoted(&mut args, "--genus", &config.genus);
        push_quoted(&mut args, "--species", &config.species);
        push_quoted(&mut args, "--strain", &config.strain);
        push_quoted(&mut args, "--plasmid", &config.plasmid);
        if config.compliant {
            args.push("--compliant".into());
        }
        // Only the two non-default tables the annotator supports; anything
        // else is dropped on purpose.
        if config.translation_table == 4 || config.translation_table == 11 {
            args.push(format!("--translation-table {}", config.translation_table));
        }
        args.push(format!("--gram {}", config.derm_type.gram_flag()));
        args.push(staged_path(&job.keys.fasta_key));

        args.join(" ")
    }

    /// `upload -e <endpoint> -k <resultKey> -b <bucket> -f <files>`.
    pub fn build_upload_spec(&self, job: &Job) -> String {
        let files = RESULT_ARTIFACTS
            .iter()
            .map(|(_, suffix)| format!("{OUTPUT_DIR}/{RESULT_PREFIX}.{suffix}"))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "upload -e {} -k {} -b {} -f {files}",
            self.endpoint, job.keys.result_key, job.keys.data_bucket
        )
    }
}

/// Where the download phase places an object: the staging dir plus the key's
/// basename.
fn staged_path(key: &str) -> String {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    format!("{STAGING_DIR}/{file_name}")
}

fn push_quoted(args: &mut Vec<String>, flag: &str, value: &str) {
    if !value.is_empty() {
        args.push(format!("{flag} {}", quote(value)));
    }
}

/// Wrap a free-text value in double quotes, escaping `\` and `"`.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
