//! Prompt templates for the enrichment calls. Placeholders are substituted
//! with `str::replace` at the call site.

pub const JD_FORMAT_SYSTEM: &str =
    "You are a powerful AI that reformats job descriptions into a structured JSON format. \
     Follow the provided template exactly. If a section is missing from the source text, \
     leave it blank but keep its key present.";

pub const JD_FORMAT_PROMPT: &str = r#"Reformat the following job description into this JSON template:

```json
{
    "companyInfo": {"companyName": "", "location": "", "industry": ""},
    "requiredQualifications": [{"degree": "", "field": "", "additionalRequirements": ""}],
    "requiredWorkExperience": {"yearsRequired": "", "description": ""},
    "rolesAndResponsibilities": [""],
    "requiredSkills": [""],
    "requiredCertifications": [{"certificationName": "", "issuingOrganization": ""}]
}
```

**Job Description Text:**
{jd_text}

Extract and reformat the information according to the template above."#;

pub const RESUME_FORMAT_SYSTEM: &str =
    "You are an AI that reformats resumes into structured JSON. You must: \
     1. Extract all relevant information. \
     2. Return ONLY valid JSON, with no markdown, code blocks, or additional text. \
     3. Ensure all text fields are properly escaped. \
     4. Include all available skills, work experience, and education details.";

pub const RESUME_FORMAT_PROMPT: &str = r#"Format the following resume into valid JSON using this structure:
{
    "personalInfo": {"name": "", "location": "", "email": "", "phone": "", "linkedIn": ""},
    "education": [{"degree": "", "field": "", "institution": "", "graduationYear": "", "gpa": ""}],
    "workExperience": [{"companyName": "", "position": "", "duration": "", "responsibilities": [""], "achievements": [""]}],
    "skills": {"technical": [""], "soft": [""], "languages": [""]},
    "certifications": [{"name": "", "issuingOrganization": "", "issueDate": "", "expiryDate": ""}],
    "projects": [{"name": "", "description": "", "technologies": [""], "link": ""}]
}

Resume text to format:
{resume_text}

IMPORTANT: Return only the JSON object itself, with no markdown formatting or code blocks."#;

pub const COMPANY_BACKGROUND_SYSTEM: &str =
    "You are a professional employment history summarizer. Create concise, informative \
     summaries of candidates' previous employment, focusing on the companies they worked \
     for, the companies' scope of business, and the candidate's role. Keep summaries to \
     2-3 sentences.";

pub const COMPANY_BACKGROUND_PROMPT: &str = r#"Create a previous employment summary based on this information:

Experience Details:
{experience}

Format the response like this example:
Has worked in [Company Names] in past. These companies are involved in [business description]. This candidate worked in [specific part of the department] within the [function/division] of the company.

Important: Focus on factual information about previous employers and the candidate's roles."#;

pub const SIMILARITY_SYSTEM: &str =
    "You are a helpful assistant. Return ONLY the JSON object with no additional text.";

pub const SIMILARITY_PROMPT: &str = r#"You are an AI assistant that calculates match percentages between resumes and job descriptions based on their JSON formats.
Evaluate the resume against the job description on these criteria:
1. Skills Match (0-100): how well the skills in the resume match the skills required in the JD.
2. Experience Match (0-100): how well the candidate's experience matches the job requirements.
3. Education Match (0-100): how well the candidate's education aligns with the job requirements.
4. Overall Relevance (0-100): overall relevance of the candidate's profile to the job.

Job Description: {processed_jd}
Resume: {processed_resume}

Also list any critical responsibilities from the JD where the candidate's experience may be limited or lacking.

Provide the output in exactly this format:

{
  "matching_score": 0,
  "sections": [
    {"name": "Skills Match", "score": 0, "max_score": 100, "overview": ""},
    {"name": "Experience Match", "score": 0, "max_score": 100, "overview": ""},
    {"name": "Education Match", "score": 0, "max_score": 100, "overview": ""},
    {"name": "Overall Relevance", "score": 0, "max_score": 100, "overview": ""}
  ],
  "potential_gaps": [
    {"description": ""}
  ]
}"#;
