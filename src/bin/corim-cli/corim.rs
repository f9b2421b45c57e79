// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Subcommand;
use corimkit::{
    comid::Comid,
    corim::{Meta, TagKind, UnsignedCorim, UNSIGNED_CORIM_PREFIX},
    cose::SignedCorim,
    openssl::OpensslSigner,
    CborCodec, JsonCodec,
};
use log::info;

use crate::{output_path, read, read_string, write};

#[derive(Subcommand)]
pub enum CorimCmd {
    /// Create an unsigned CoRIM from a JSON template and encoded tags
    Create {
        /// CoRIM JSON template
        #[arg(short, long)]
        template: PathBuf,
        /// CBOR CoMID to embed, may be repeated
        #[arg(short = 'm', long = "comid")]
        comids: Vec<PathBuf>,
        /// CBOR CoSWID to embed, may be repeated
        #[arg(short = 's', long = "coswid")]
        coswids: Vec<PathBuf>,
        /// CBOR CoTS to embed, may be repeated
        #[arg(short = 'c', long = "cots")]
        cots: Vec<PathBuf>,
        /// Output file, defaults to the template name with a .cbor extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sign an unsigned CoRIM with a JWK private key
    Sign {
        /// Unsigned CoRIM (CBOR)
        #[arg(short, long)]
        file: PathBuf,
        /// CoRIM meta JSON template
        #[arg(short, long)]
        meta: PathBuf,
        /// Signing key in JWK format
        #[arg(short, long)]
        key: PathBuf,
        /// Output file, defaults to signed-<input name>
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Verify a signed CoRIM with a JWK public key
    Verify {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        key: PathBuf,
    },
    /// Print a signed or unsigned CoRIM as JSON
    Display {
        #[arg(short, long)]
        file: PathBuf,
        /// Also decode and print the embedded CoMIDs
        #[arg(long)]
        show_tags: bool,
    },
    /// Save the tags embedded in a CoRIM as individual files
    Extract {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

pub fn run(command: CorimCmd) -> anyhow::Result<()> {
    match command {
        CorimCmd::Create {
            template,
            comids,
            coswids,
            cots,
            output,
        } => {
            let output = match output {
                Some(output) => output,
                None => output_path(Path::new("."), &template)?,
            };
            create(&template, &comids, &coswids, &cots, &output)
        }
        CorimCmd::Sign {
            file,
            meta,
            key,
            output,
        } => {
            let output = match output {
                Some(output) => output,
                None => signed_name(&file)?,
            };
            sign(&file, &meta, &key, &output)
        }
        CorimCmd::Verify { file, key } => verify(&file, &key),
        CorimCmd::Display { file, show_tags } => display(&file, show_tags),
        CorimCmd::Extract { file, output_dir } => extract(&file, &output_dir).map(|_| ()),
    }
}

fn signed_name(input: &Path) -> anyhow::Result<PathBuf> {
    let name = input
        .file_name()
        .with_context(|| format!("{} has no file name", input.display()))?;
    Ok(input.with_file_name(format!("signed-{}", name.to_string_lossy())))
}

fn create(
    template: &Path,
    comids: &[PathBuf],
    coswids: &[PathBuf],
    cots: &[PathBuf],
    output: &Path,
) -> anyhow::Result<()> {
    if comids.is_empty() && coswids.is_empty() && cots.is_empty() {
        bail!("no CoMID, CoSWID or CoTS files supplied");
    }

    let mut rim = UnsignedCorim::from_json_template(&read_string(template)?)
        .with_context(|| format!("error decoding template {}", template.display()))?;

    for file in comids {
        let comid = Comid::from_cbor(&read(file)?)
            .with_context(|| format!("error decoding CoMID from {}", file.display()))?;
        rim.add_comid(&comid)?;
    }
    for file in coswids {
        rim.add_coswid(&read(file)?);
    }
    for file in cots {
        rim.add_cots(&read(file)?);
    }

    let data = rim.to_cbor().context("error encoding CoRIM")?;
    write(output, &data)
}

fn sign(file: &Path, meta: &Path, key: &Path, output: &Path) -> anyhow::Result<()> {
    let rim = UnsignedCorim::from_cbor(&read(file)?)
        .with_context(|| format!("error decoding unsigned CoRIM from {}", file.display()))?;
    let meta = Meta::from_json(&read_string(meta)?)
        .with_context(|| format!("error decoding CoRIM meta from {}", meta.display()))?;
    let signer = OpensslSigner::from_jwk(&read_string(key)?)
        .with_context(|| format!("error loading signing key from {}", key.display()))?;

    let data = SignedCorim::new(rim, meta)
        .sign(&signer)
        .context("error signing CoRIM")?;
    write(output, &data)
}

fn verify(file: &Path, key: &Path) -> anyhow::Result<()> {
    let verifier = OpensslSigner::from_jwk(&read_string(key)?)
        .with_context(|| format!("error loading verification key from {}", key.display()))?;

    SignedCorim::verify_cose(&read(file)?, &verifier)
        .with_context(|| format!("error verifying {}", file.display()))?;
    info!(">> {} verified", file.display());
    Ok(())
}

/// A CoRIM read from disk, with its meta when it was signed.
struct Loaded {
    rim: UnsignedCorim,
    meta: Option<Meta>,
}

fn load(file: &Path) -> anyhow::Result<Loaded> {
    let data = read(file)?;

    let loaded = match data.as_slice() {
        d if d.starts_with(&UNSIGNED_CORIM_PREFIX) => Loaded {
            rim: UnsignedCorim::from_tagged_cbor(d)?,
            meta: None,
        },
        // COSE_Sign1, tagged (18) or as a bare 4-element array
        [0xd2, ..] | [0x84, ..] => {
            let signed = SignedCorim::from_cose(&data)?;
            Loaded {
                rim: signed.unsigned,
                meta: Some(signed.meta),
            }
        }
        _ => Loaded {
            rim: UnsignedCorim::from_cbor(&data)?,
            meta: None,
        },
    };
    Ok(loaded)
}

fn display(file: &Path, show_tags: bool) -> anyhow::Result<()> {
    let loaded =
        load(file).with_context(|| format!("error decoding CoRIM from {}", file.display()))?;

    if let Some(meta) = &loaded.meta {
        println!("Meta:\n{}", meta.to_json_pretty()?);
    }
    println!("Corim:\n{}", loaded.rim.to_json_pretty()?);

    if show_tags {
        println!("Tags:");
        for (i, (kind, content)) in loaded.rim.extract_tags()?.into_iter().enumerate() {
            match kind {
                TagKind::Comid => {
                    let comid = Comid::from_cbor(content)
                        .with_context(|| format!("error decoding CoMID at index {i}"))?;
                    println!(">> [{i}] {kind}\n{}", comid.to_json_pretty()?);
                }
                _ => println!(">> [{i}] {kind}\n{}", hex::encode(content)),
            }
        }
    }
    Ok(())
}

/// Writes each embedded tag, without its CBOR tag prefix, to
/// `NNNNNN-<kind>.cbor` under `output_dir` and returns the written paths.
pub(crate) fn extract(file: &Path, output_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let loaded =
        load(file).with_context(|| format!("error decoding CoRIM from {}", file.display()))?;

    let mut written = Vec::new();
    for (i, (kind, content)) in loaded.rim.extract_tags()?.into_iter().enumerate() {
        let path = output_dir.join(format!("{i:06}-{kind}.cbor"));
        write(&path, content)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corimkit::corim::{Signer, Tag};

    const PRIVATE_JWK: &str = r#"{
        "kty": "EC",
        "crv": "P-256",
        "d": "ZxfIqWVgn8uXSNQj0t8r_u6iS8WJuKxbmUzwNlpE760",
        "x": "_gPssLIiLnF0XrTGU73XMKlTIk4QhU80ttXzJ7waTpo",
        "y": "HgibD8RtoczLlJBzDi62cTacMR9NOL8mh6RfU2E3lwk"
    }"#;

    const COMID: &str = concat!(
        r#"{"tag-identity":{"id":"extracted"},"#,
        r#""triples":{"reference-values":[{"environment":{"class":{"vendor":"ACME"}},"#,
        r#""measurements":[{"value":{"name":"BL"}}]}]}}"#,
    );

    #[test]
    fn test_signed_name() {
        assert_eq!(
            signed_name(Path::new("out/corim.cbor")).unwrap(),
            PathBuf::from("out/signed-corim.cbor")
        );
    }

    #[test]
    fn test_extract_unsigned() {
        let dir = tempfile::tempdir().unwrap();

        let mut rim = UnsignedCorim::new("extract-me");
        rim.add_coswid(&[0xa0]);
        rim.tags.push(Tag::new(TagKind::Cots, &[0xa1, 0x00, 0x01]));
        let input = dir.path().join("corim.cbor");
        std::fs::write(&input, rim.to_tagged_cbor().unwrap()).unwrap();

        let written = extract(&input, dir.path()).unwrap();
        assert_eq!(
            written,
            vec![
                dir.path().join("000000-coswid.cbor"),
                dir.path().join("000001-cots.cbor"),
            ]
        );
        assert_eq!(std::fs::read(&written[0]).unwrap(), vec![0xa0]);
        assert_eq!(std::fs::read(&written[1]).unwrap(), vec![0xa1, 0x00, 0x01]);
    }

    #[test]
    fn test_extract_signed() {
        let dir = tempfile::tempdir().unwrap();

        let comid = Comid::from_json(COMID).unwrap();
        let mut rim = UnsignedCorim::new("extract-signed");
        rim.add_comid(&comid).unwrap();
        rim.add_coswid(&[0xa0]);
        rim.add_cots(&[0xa1, 0x00, 0x01]);

        let signer = OpensslSigner::from_jwk(PRIVATE_JWK).unwrap();
        let signed = SignedCorim::new(rim, Meta::new(Signer::new("ACME Ltd.")))
            .sign(&signer)
            .unwrap();
        let input = dir.path().join("signed-corim.cbor");
        std::fs::write(&input, signed).unwrap();

        let out = dir.path().join("tags");
        std::fs::create_dir(&out).unwrap();
        let written = extract(&input, &out).unwrap();
        assert_eq!(
            written,
            vec![
                out.join("000000-comid.cbor"),
                out.join("000001-coswid.cbor"),
                out.join("000002-cots.cbor"),
            ]
        );

        let data = std::fs::read(&written[0]).unwrap();
        assert_eq!(data, comid.to_cbor().unwrap());
        assert_eq!(Comid::from_cbor(&data).unwrap(), comid);
    }
}
