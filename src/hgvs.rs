//! Parser for transcript-relative HGVS descriptors.
//!
//! Supported: `<accession>[(<gene>)]:c.` and `n.` positions (`N`, `-N`, `*N`, ranges `A_B`) with
//! substitutions (`A>G`), deletions (`del`, `delAT`), insertions (`insTT`), duplications
//! (`dup`, `dupA`), deletion-insertions (`delinsTT`, `delAinsTT`) and identity (`=`).
//! Intronic offsets and uncertain positions are rejected.
//!
//! Positions are converted to 1-based spliced transcript positions using the resolved
//! transcript's coding offset. Declared delins alleles are trimmed of shared flanking bases so
//! equivalent spellings parse to the same edit.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, map_res, opt, recognize, value},
    sequence::{delimited, preceded},
};

use crate::error::ConvertError;
use crate::structures::TranscriptModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Substitution,
    Deletion,
    Insertion,
    Duplication,
    DelIns,
    Identity,
}

/// Parsed variant in transcript coordinates.
///
/// `transcript_position..=transcript_end` are the affected bases, 1-based. For insertions they
/// are the two flanking bases and `ref_allele` is empty. `ref_allele` is `None` when the
/// descriptor does not spell out the reference bases. Alleles are in transcript orientation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantEdit {
    pub transcript_id: String,
    pub kind: EditKind,
    pub transcript_position: i64,
    pub transcript_end: i64,
    pub ref_allele: Option<Vec<u8>>,
    pub alt_allele: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    /// `n.N`
    TranscriptStart,
    /// `c.N`, `c.-N`
    CodingStart,
    /// `c.*N`
    CodingEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    anchor: Anchor,
    value: i64,
}

impl Position {
    /// `None` when the position does not fit the coordinate range.
    fn to_transcript(self, model: &TranscriptModel) -> Option<i64> {
        let coding_offset = i64::try_from(model.coding_offset).ok()?;
        let coding_end = i64::try_from(model.coding_end).ok()?;
        match self.anchor {
            Anchor::TranscriptStart => Some(self.value),
            Anchor::CodingStart if self.value > 0 => coding_offset.checked_add(self.value),
            // There is no c.0: c.-1 is the base right before c.1.
            Anchor::CodingStart => coding_offset.checked_add(self.value)?.checked_add(1),
            Anchor::CodingEnd => coding_end.checked_add(self.value),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Location {
    start: Position,
    end: Option<Position>,
    intronic: bool,
}

type Edit = (EditKind, Option<Vec<u8>>, Vec<u8>);

#[derive(Debug)]
struct Syntax {
    accession: String,
    location: Location,
    kind: EditKind,
    ref_allele: Option<Vec<u8>>,
    alt_allele: Vec<u8>,
}

fn is_base(c: char) -> bool {
    matches!(c.to_ascii_uppercase(), 'A' | 'C' | 'G' | 'T' | 'N')
}

/// One or more nucleotides, upper-cased.
fn bases(input: &str) -> IResult<&str, Vec<u8>> {
    map(take_while1(is_base), |s: &str| s.to_ascii_uppercase().into_bytes()).parse(input)
}

fn number(input: &str) -> IResult<&str, i64> {
    map_res(digit1, |s: &str| s.parse::<i64>()).parse(input)
}

/// `+5`, `-12`, `+?`: offsets into an intron.
fn intron_offset(input: &str) -> IResult<&str, &str> {
    recognize((one_of("+-"), alt((digit1, tag("?"))))).parse(input)
}

fn coding_position(input: &str) -> IResult<&str, Position> {
    alt((
        map(preceded(char('*'), number), |value| Position { anchor: Anchor::CodingEnd, value }),
        map(preceded(char('-'), number), |value| Position { anchor: Anchor::CodingStart, value: -value }),
        map(number, |value| Position { anchor: Anchor::CodingStart, value }),
    ))
    .parse(input)
}

fn transcript_position(input: &str) -> IResult<&str, Position> {
    map(number, |value| Position { anchor: Anchor::TranscriptStart, value }).parse(input)
}

fn location<'s>(
    input: &'s str,
    position: fn(&'s str) -> IResult<&'s str, Position>,
) -> IResult<&'s str, Location> {
    let (input, (start, start_offset)) = (position, opt(intron_offset)).parse(input)?;
    let (input, end) = opt(preceded(char('_'), (position, opt(intron_offset)))).parse(input)?;
    let intronic = start_offset.is_some() || end.is_some_and(|(_, offset)| offset.is_some());
    Ok((input, Location { start, end: end.map(|(p, _)| p), intronic }))
}

fn substitution(input: &str) -> IResult<&str, Edit> {
    map((bases, char('>'), bases), |(reference, _, alternate)| {
        (EditKind::Substitution, Some(reference), alternate)
    })
    .parse(input)
}

fn identity(input: &str) -> IResult<&str, Edit> {
    map((opt(bases), char('=')), |(reference, _)| (EditKind::Identity, reference, Vec::new())).parse(input)
}

/// `del`, `delAT`, `delinsTT`, `delATinsTT`.
fn deletion(input: &str) -> IResult<&str, Edit> {
    map(
        preceded(tag("del"), (opt(bases), opt(preceded(tag("ins"), bases)))),
        |(deleted, inserted)| match inserted {
            Some(alternate) => (EditKind::DelIns, deleted, alternate),
            None => (EditKind::Deletion, deleted, Vec::new()),
        },
    )
    .parse(input)
}

fn insertion(input: &str) -> IResult<&str, Edit> {
    map(preceded(tag("ins"), bases), |alternate| (EditKind::Insertion, Some(Vec::new()), alternate)).parse(input)
}

fn duplication(input: &str) -> IResult<&str, Edit> {
    map(preceded(tag("dup"), opt(bases)), |duplicated| (EditKind::Duplication, duplicated, Vec::new())).parse(input)
}

fn edit(input: &str) -> IResult<&str, Edit> {
    alt((substitution, identity, deletion, insertion, duplication)).parse(input)
}

fn accession(input: &str) -> IResult<&str, &str> {
    let (input, accession) = take_while1(|c: char| c != ':' && c != '(').parse(input)?;
    // NM_000546.5(TP53) carries the gene symbol for readability only
    let (input, _) = opt(delimited(char('('), take_while1(|c: char| c != ')'), char(')'))).parse(input)?;
    let (input, _) = char(':').parse(input)?;
    Ok((input, accession.trim()))
}

fn syntax(input: &str) -> IResult<&str, Syntax> {
    let (input, accession) = accession(input)?;
    let (input, coding) = alt((value(true, tag("c.")), value(false, tag("n.")))).parse(input)?;
    let (input, location) = if coding {
        location(input, coding_position)?
    } else {
        location(input, transcript_position)?
    };
    let (input, (kind, ref_allele, alt_allele)) = edit(input)?;
    Ok((input, Syntax { accession: accession.to_string(), location, kind, ref_allele, alt_allele }))
}

fn parse_syntax(descriptor: &str) -> Result<Syntax, String> {
    let (rest, syntax) = syntax(descriptor).map_err(|err| match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => format!("cannot parse '{}'", e.input),
        nom::Err::Incomplete(_) => "incomplete descriptor".to_string(),
    })?;
    if !rest.is_empty() {
        return Err(format!("unexpected trailing text '{rest}'"));
    }
    if syntax.accession.is_empty() {
        return Err("empty accession".into());
    }
    let location = syntax.location;
    if location.intronic {
        return Err("intronic offsets are not supported".into());
    }
    if location.start.value == 0 || location.end.is_some_and(|p| p.value == 0) {
        return Err("position 0 does not exist".into());
    }
    if syntax.kind == EditKind::Substitution {
        let single = |allele: &[u8]| allele.len() == 1;
        if !syntax.ref_allele.as_deref().is_some_and(single) || !single(syntax.alt_allele.as_slice()) {
            return Err("a substitution replaces exactly one base".into());
        }
    }
    Ok(syntax)
}

/// Removes the bases shared by both ends of `reference` and `alternate`, suffix first.
/// Returns how many leading bases were removed.
fn trim_shared(reference: &mut Vec<u8>, alternate: &mut Vec<u8>) -> usize {
    while !reference.is_empty() && !alternate.is_empty() && reference.last() == alternate.last() {
        reference.pop();
        alternate.pop();
    }
    let prefix = reference.iter().zip(alternate.iter()).take_while(|(r, a)| r == a).count();
    reference.drain(..prefix);
    alternate.drain(..prefix);
    prefix
}

/// Parses `descriptor`, resolving its accession through `resolve_transcript`.
pub fn parse<'a, F>(descriptor: &str, resolve_transcript: F) -> Result<VariantEdit, ConvertError>
where
    F: Fn(&str) -> Option<&'a TranscriptModel>,
{
    let syntax = parse_syntax(descriptor.trim()).map_err(|reason| ConvertError::malformed(descriptor, reason))?;
    let model = resolve_transcript(&syntax.accession)
        .ok_or_else(|| ConvertError::UnknownTranscript(syntax.accession.clone()))?;
    let out_of_range = || ConvertError::malformed(descriptor, "position out of range");

    let location = syntax.location;
    let mut start = location.start.to_transcript(model).ok_or_else(out_of_range)?;
    let mut end = match location.end {
        Some(position) => position.to_transcript(model).ok_or_else(out_of_range)?,
        None => start,
    };
    if end < start {
        return Err(ConvertError::malformed(descriptor, "range end precedes its start"));
    }
    let span = end.checked_sub(start).and_then(|d| d.checked_add(1)).ok_or_else(out_of_range)?;

    let mut kind = syntax.kind;
    let mut ref_allele = syntax.ref_allele;
    let mut alt_allele = syntax.alt_allele;

    match kind {
        EditKind::Substitution if location.end.is_some() => {
            return Err(ConvertError::malformed(descriptor, "a substitution takes a single position"));
        }
        EditKind::Insertion => {
            if start.checked_add(1) != Some(end) {
                return Err(ConvertError::malformed(
                    descriptor,
                    "an insertion must lie between two adjacent positions",
                ));
            }
        }
        _ => {
            if let Some(declared) = &ref_allele {
                let declared_len = declared.len() as i64;
                if location.end.is_none() {
                    end = start.checked_add(declared_len - 1).ok_or_else(out_of_range)?;
                } else if declared_len != span {
                    return Err(ConvertError::malformed(
                        descriptor,
                        format!("declares {} reference bases for a range of {}", declared_len, span),
                    ));
                }
            }
        }
    }

    if kind == EditKind::DelIns {
        if let Some(declared) = ref_allele.as_mut() {
            if *declared == alt_allele {
                kind = EditKind::Identity;
            } else {
                let mut reference = declared.clone();
                let mut alternate = alt_allele.clone();
                let prefix = trim_shared(&mut reference, &mut alternate) as i64;
                let trimmed_start = start.checked_add(prefix).ok_or_else(out_of_range)?;

                if reference.is_empty() {
                    // insertion between the bases flanking the emptied range; at either end of the
                    // transcript it stays a delins and is reduced on the genome
                    let inside = u64::try_from(trimmed_start).is_ok_and(|right| right <= model.size());
                    if trimmed_start > 1 && inside {
                        start = trimmed_start - 1;
                        end = trimmed_start;
                        kind = EditKind::Insertion;
                        *declared = reference;
                        alt_allele = alternate;
                    }
                } else {
                    start = trimmed_start;
                    end = start + reference.len() as i64 - 1;
                    kind = match (reference.len(), alternate.len()) {
                        (_, 0) => EditKind::Deletion,
                        (1, 1) => EditKind::Substitution,
                        _ => EditKind::DelIns,
                    };
                    *declared = reference;
                    alt_allele = alternate;
                }
            }
        }
    }
    if kind == EditKind::Identity {
        if let Some(declared) = &ref_allele {
            alt_allele = declared.clone();
        }
    }

    Ok(VariantEdit {
        transcript_id: model.id.clone(),
        kind,
        transcript_position: start,
        transcript_end: end,
        ref_allele,
        alt_allele,
    })
}
