use crate::ocr::Fragment;

pub(super) fn has_text(fragment: &Fragment) -> bool {
    !fragment.text.trim().is_empty()
}

pub(super) fn join_texts<'a, I>(texts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    texts
        .into_iter()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
